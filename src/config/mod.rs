pub mod cli;
pub mod impls;
pub mod profiles;
pub mod resolve;
pub mod structs;

pub use cli::Args;
pub use profiles::*;
pub use resolve::resolve_config;
pub use structs::*;
