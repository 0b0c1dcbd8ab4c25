mod build;
mod chroot;
mod init;
mod session;
mod update;

pub use build::*;
pub use chroot::*;
pub use init::*;
pub use update::*;
