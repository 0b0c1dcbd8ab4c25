mod build;
mod chroot;
mod update;

pub use build::*;
pub use chroot::*;
pub use update::*;

use anyhow::{Context, Result};
use log::debug;

const NETWORKING_REQUESTED: &str =
    "Package has explicitly requested networking, sandboxing disabled";

/// One named step of a pipeline.
pub struct Stage<S> {
    pub name: &'static str,
    pub run: fn(&mut S) -> Result<()>,
}

impl<S> Stage<S> {
    pub const fn new(
        name: &'static str,
        run: fn(&mut S) -> Result<()>,
    ) -> Self {
        Stage { name, run }
    }
}

/// Run `stages` in order, stopping at the first failure. The error names the
/// stage and `label`.
pub fn run_stages<S>(
    state: &mut S,
    stages: &[Stage<S>],
    label: &str,
) -> Result<()> {
    for stage in stages {
        debug!("{}: stage {}", label, stage.name);
        (stage.run)(state).with_context(|| {
            format!("{}: stage {} failed", label, stage.name)
        })?;
    }
    Ok(())
}
