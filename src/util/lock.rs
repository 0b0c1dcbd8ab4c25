use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use log::trace;
use nix::fcntl::{Flock, FlockArg};

use anyhow::{Result, anyhow};

pub struct Lock {
    path: PathBuf,
    #[allow(dead_code)]
    lock: Flock<File>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Held while an image is being fetched or upgraded.
    Exclusive,
    /// Held by build and chroot sessions reading the image.
    Shared,
}

impl Lock {
    /** Acquire a lock on a backing image. Blocks until available. */
    pub fn image(
        images_dir: &Path,
        image_name: &str,
        mode: LockMode,
    ) -> Result<Lock> {
        let lock_file = images_dir.join(format!("{}.lock", image_name));
        Lock::acquire(lock_file, &format!("image {}", image_name), mode)
    }

    /** Exclusive lock for one package's overlay on `profile`. Lives beside
     * the overlay directory rather than inside it. */
    pub fn session(
        overlay_dir: &Path,
        profile: &str,
        package: &str,
    ) -> Result<Lock> {
        let dir = overlay_dir.join(profile);
        std::fs::create_dir_all(&dir)
            .map_err(|e| anyhow!("Failed to create {}: {}", dir.display(), e))?;
        Lock::acquire(
            dir.join(format!("{}.lock", package)),
            &format!("package {}", package),
            LockMode::Exclusive,
        )
    }

    fn acquire(lock_file: PathBuf, what: &str, mode: LockMode) -> Result<Lock> {
        let kind = match mode {
            LockMode::Exclusive => "exclusive",
            LockMode::Shared => "shared",
        };
        trace!("Acquiring {} lock {}", kind, lock_file.display());
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_file)
            .map_err(|e| {
                anyhow!("Failed to open lock file for {}: {}", what, e)
            })?;

        let arg = match mode {
            LockMode::Exclusive => FlockArg::LockExclusive,
            LockMode::Shared => FlockArg::LockShared,
        };
        let lock = Flock::lock(file, arg)
            .map_err(|(_, e)| anyhow!("Failed to acquire lock: {}", e))?;

        trace!("Acquired lock {}", lock_file.display());
        Ok(Lock {
            path: lock_file,
            lock,
        })
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        trace!("Unlocking lock {}", self.path.display());
    }
}
