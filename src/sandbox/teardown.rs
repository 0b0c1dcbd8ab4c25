use super::Overlay;
use crate::util::MountManager;
use log::{debug, error};

impl Overlay {
    /// Unmount extra mounts newest first, then the core mounts newest first.
    /// Failures are logged and the rest still attempted. Returns how many
    /// unmounts failed.
    pub fn teardown(&mut self, mounts: &dyn MountManager) -> usize {
        let mut failures = 0;

        let extra = std::mem::take(&mut self.extra_mounts);
        let core = std::mem::take(&mut self.core_mounts);
        for target in extra.iter().rev().chain(core.iter().rev()) {
            if let Err(e) = mounts.unmount(target) {
                error!("Failed to unmount {}: {}", target.display(), e);
                failures += 1;
            }
        }

        if self.active {
            debug!("Deactivated {} root", self.name);
        }
        self.active = false;
        failures
    }
}
