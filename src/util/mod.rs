mod copy;
mod download;
mod hash;
mod lock;
mod mkdir;
mod mount;
mod mounts;
mod output;

pub use copy::*;
pub use download::*;
pub use hash::*;
pub use lock::*;
pub use mkdir::*;
pub use mount::*;
pub use mounts::*;
pub use output::*;
