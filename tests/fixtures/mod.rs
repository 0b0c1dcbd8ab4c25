mod fixture_builder;

pub use fixture_builder::*;
