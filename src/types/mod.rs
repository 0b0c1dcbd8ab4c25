mod identity;
mod package;

pub use identity::*;
pub use package::*;
