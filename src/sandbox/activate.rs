use super::{Layering, Overlay};
use crate::error::{BuildError, Result};
use crate::util::{MountManager, check_path_for_mount_option_compatibility};
use log::{debug, info};
use std::io;
use std::path::{Path, PathBuf};

/// Virtual filesystems every root gets: (fstype, source, target, options).
const VFS_MOUNTS: [(&str, &str, &str, Option<&str>); 5] = [
    ("devtmpfs", "devtmpfs", "dev", None),
    ("devpts", "devpts", "dev/pts", Some("gid=5,mode=620")),
    ("proc", "proc", "proc", None),
    ("sysfs", "sysfs", "sys", None),
    ("tmpfs", "tmpfs", "dev/shm", None),
];

fn cleanup_error(path: &Path, source: io::Error) -> BuildError {
    BuildError::MountCleanup {
        path: path.to_path_buf(),
        source,
    }
}

impl Overlay {
    /// Unmount anything a crashed session left behind and remove its files.
    pub fn clean_existing(&mut self, mounts: &dyn MountManager) -> Result<()> {
        let base = &self.base_dir;
        let stale = mounts
            .mounts_under(base)
            .map_err(|e| cleanup_error(base, io::Error::other(e)))?;
        for mount in stale {
            debug!("Unmounting stale {}", mount.display());
            mounts
                .unmount(&mount)
                .map_err(|e| cleanup_error(&mount, io::Error::other(e)))?;
        }

        let remaining = mounts
            .mounts_under(&self.base_dir)
            .map_err(|e| cleanup_error(&self.base_dir, io::Error::other(e)))?;
        if let Some(busy) = remaining.first() {
            return Err(cleanup_error(
                busy,
                io::Error::from_raw_os_error(libc::EBUSY),
            ));
        }

        if self.layering == Layering::Overlay && self.base_dir.exists() {
            debug!("Removing old overlay {}", self.base_dir.display());
            std::fs::remove_dir_all(&self.base_dir)
                .map_err(|e| cleanup_error(&self.base_dir, e))?;
        }
        Ok(())
    }

    fn push_mount(
        &mut self,
        target: PathBuf,
        mount: impl FnOnce(&Path) -> Result<()>,
    ) -> Result<()> {
        std::fs::create_dir_all(&target)
            .map_err(|e| BuildError::mount(&target, e))?;
        mount(&target)?;
        self.core_mounts.push(target);
        Ok(())
    }

    /// Mount the image, the overlay on top of it, and the virtual
    /// filesystems. Mounts made before a failure stay recorded for teardown.
    pub fn activate(&mut self, mounts: &dyn MountManager) -> Result<()> {
        if self.active {
            return Err(BuildError::mount(
                &self.mount_point,
                io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "overlay is already active",
                ),
            ));
        }

        info!("Activating {} root", self.name);
        let layered = self.layering == Layering::Overlay;
        if layered {
            for dir in [
                &self.work_dir,
                &self.upper_dir,
                &self.lower_dir,
                &self.mount_point,
            ] {
                check_path_for_mount_option_compatibility(dir)?;
                std::fs::create_dir_all(dir)
                    .map_err(|e| BuildError::mount(dir, e))?;
            }
        }
        self.active = true;

        let image_path = self.image.image_path.clone();
        self.push_mount(self.lower_dir.clone(), |target| {
            mounts.loop_mount(&image_path, target, layered)
        })?;

        if layered {
            let options = format!(
                "lowerdir={},upperdir={},workdir={}",
                self.lower_dir.display(),
                self.upper_dir.display(),
                self.work_dir.display()
            );
            self.push_mount(self.mount_point.clone(), |target| {
                mounts.mount_fs("overlay", "overlay", target, Some(&options))
            })?;
        }

        for (fstype, source, target, data) in VFS_MOUNTS {
            let target = self.mount_point.join(target);
            self.push_mount(target, |target| {
                mounts.mount_fs(fstype, source, target, data)
            })?;
        }
        Ok(())
    }
}
