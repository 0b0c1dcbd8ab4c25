mod activate;
mod eopkg;
mod exec;
mod layout;
mod network;
mod overlay;
mod session;
mod sources;
mod supervisor;
mod teardown;

#[cfg(test)]
pub(crate) mod testing;

pub use eopkg::*;
pub use exec::*;
pub use layout::*;
pub use network::*;
pub use overlay::*;
pub use session::*;
pub use sources::*;
pub use supervisor::*;
