use crate::error::{BuildError, Result};
use log::{debug, warn};
use nix::errno::Errno;
use nix::mount::{MntFlags, MsFlags};
use std::ffi::{CStr, CString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::get_mounts;

fn to_cstring<S: AsRef<std::ffi::OsStr>>(
    value: S,
    target: &Path,
) -> Result<CString> {
    CString::new(value.as_ref().to_string_lossy().as_bytes()).map_err(|e| {
        let e = io::Error::new(io::ErrorKind::InvalidInput, e);
        BuildError::mount(target, e)
    })
}

pub fn mount<S1, S3, S4>(
    source: Option<S1>,
    target: &Path,
    fstype: Option<S3>,
    flags: MsFlags,
    data: Option<S4>,
) -> Result<()>
where
    S1: AsRef<std::ffi::OsStr>,
    S3: AsRef<std::ffi::OsStr>,
    S4: AsRef<std::ffi::OsStr>,
{
    let source_cstr = match &source {
        Some(source) => to_cstring(source, target)?,
        None => CString::default(),
    };
    let target_cstr = to_cstring(target, target)?;
    let fstype_cstr = match &fstype {
        Some(fstype) => to_cstring(fstype, target)?,
        None => CString::default(),
    };
    let data_cstr = match &data {
        Some(data) => to_cstring(data, target)?,
        None => CString::default(),
    };

    let source = source.map(|_| source_cstr.as_c_str());
    let fstype = fstype.map(|_| fstype_cstr.as_c_str());
    let data = data.map(|_| data_cstr.as_c_str());

    debug!(
        "mount {} {} [type={}, flags={}, data={}]",
        source_cstr.to_string_lossy(),
        target.display(),
        fstype_cstr.to_string_lossy(),
        flags.bits(),
        data_cstr.to_string_lossy(),
    );

    let result = nix::mount::mount::<CStr, CStr, CStr, CStr>(
        source,
        target_cstr.as_c_str(),
        fstype,
        flags,
        data,
    );

    if let Err(e) = result {
        if e == Errno::EINVAL
            && fstype_cstr.to_string_lossy() == "overlay"
            && data
                .map(|d| d.to_string_lossy().contains("lowerdir=/"))
                .unwrap_or(false)
        {
            return Err(BuildError::mount(
                target,
                io::Error::other(
                    "overlayfs rejected the layer options, the lower \
                    directory may itself live on an overlay filesystem",
                ),
            ));
        }

        return Err(BuildError::mount(target, e));
    }

    Ok(())
}

/**
 * Checks a path to ensure it can be embedded in overlayfs mount options.
 *
 * Commas and colons would split the option string, so only a conservative
 * character set is accepted.
 */
pub fn check_path_for_mount_option_compatibility(path: &Path) -> Result<()> {
    let invalid = |reason: String| {
        BuildError::mount(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, reason),
        )
    };

    if path.components().count() == 0 {
        return Err(invalid(format!("Path {} is empty", path.display())));
    }

    path.components().try_for_each(|component| {
        let Some(component_str) = component.as_os_str().to_str() else {
            return Err(invalid(format!(
                "Path {} contains invalid character",
                path.display()
            )));
        };

        if !component_str.chars().all(|c| {
            c.is_alphanumeric()
                || c == '_'
                || c == '-'
                || c == '.'
                || c == '/'
                || c == '@'
                || c == '%'
                || c == '+'
        }) {
            Err(invalid(format!(
                "Path {} contains invalid character {}",
                path.display(),
                component_str
            )))
        } else {
            Ok(())
        }
    })
}

/// Everything the sandbox needs from the kernel mount table. Implemented by
/// [`KernelMounts`] and by recording fakes in tests.
pub trait MountManager: Send + Sync {
    /// Mount a filesystem of `fstype` (overlay, proc, devtmpfs...).
    fn mount_fs(
        &self,
        fstype: &str,
        source: &str,
        target: &Path,
        data: Option<&str>,
    ) -> Result<()>;

    fn bind(&self, source: &Path, target: &Path, read_only: bool)
    -> Result<()>;

    /// Attach `image` to a loop device and mount it on `target`.
    fn loop_mount(
        &self,
        image: &Path,
        target: &Path,
        read_only: bool,
    ) -> Result<()>;

    fn unmount(&self, target: &Path) -> Result<()>;

    /// Mount points at or below `base`, deepest first.
    fn mounts_under(&self, base: &Path) -> Result<Vec<PathBuf>>;
}

pub struct KernelMounts;

impl MountManager for KernelMounts {
    fn mount_fs(
        &self,
        fstype: &str,
        source: &str,
        target: &Path,
        data: Option<&str>,
    ) -> Result<()> {
        mount(Some(source), target, Some(fstype), MsFlags::empty(), data)
    }

    fn bind(
        &self,
        source: &Path,
        target: &Path,
        read_only: bool,
    ) -> Result<()> {
        mount(
            Some(source),
            target,
            None::<&str>,
            MsFlags::MS_BIND,
            None::<&str>,
        )?;

        // MS_RDONLY is ignored on the initial bind, it needs a remount
        if read_only {
            mount(
                None::<&str>,
                target,
                None::<&str>,
                MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
                None::<&str>,
            )?;
        }
        Ok(())
    }

    fn loop_mount(
        &self,
        image: &Path,
        target: &Path,
        read_only: bool,
    ) -> Result<()> {
        let options = if read_only { "loop,ro" } else { "loop" };
        debug!(
            "mount -o {} {} {}",
            options,
            image.display(),
            target.display()
        );
        let status = Command::new("mount")
            .arg("-o")
            .arg(options)
            .arg(image)
            .arg(target)
            .status()
            .map_err(|e| BuildError::mount(target, e))?;

        if !status.success() {
            return Err(BuildError::mount(
                target,
                io::Error::other(format!(
                    "loop mount of {} failed: {}",
                    image.display(),
                    status
                )),
            ));
        }
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        debug!("Unmounting {}", target.display());
        match nix::mount::umount2(target, MntFlags::empty()) {
            Ok(()) => Ok(()),
            Err(Errno::EBUSY) => {
                warn!(
                    "{} is busy, falling back to a lazy unmount",
                    target.display()
                );
                nix::mount::umount2(target, MntFlags::MNT_DETACH)
                    .map_err(|e| BuildError::mount(target, e))
            }
            Err(e) => Err(BuildError::mount(target, e)),
        }
    }

    fn mounts_under(&self, base: &Path) -> Result<Vec<PathBuf>> {
        Ok(get_mounts(base)?.into_iter().map(PathBuf::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;

    use super::*;

    #[test]
    fn test_check_path_for_mount_option_compatibility() {
        let path = Path::new("/var/cache/solbuild/main-x86_64/nano");
        assert!(check_path_for_mount_option_compatibility(path).is_ok());
        let path = Path::new("/var/cache/solbuild/main/libstdc++");
        assert!(check_path_for_mount_option_compatibility(path).is_ok());
    }

    #[test]
    fn test_check_path_for_mount_option_rejects_separators() {
        for path in ["/tmp/a b", "/tmp/a,b", "/tmp/a:b"] {
            assert!(
                check_path_for_mount_option_compatibility(Path::new(path))
                    .is_err()
            );
        }
    }

    #[test]
    fn test_check_path_for_mount_option_compatibility_empty() {
        let path = Path::new("");
        assert!(check_path_for_mount_option_compatibility(path).is_err());
    }

    #[test]
    fn test_check_path_for_mount_option_compatibility_non_utf8() {
        let os_string = OsString::from_vec(vec![0xFF, 0xFF]);
        let path = Path::new(&os_string);

        assert!(check_path_for_mount_option_compatibility(path).is_err());
    }

    #[test]
    fn test_mount_rejects_interior_nul() {
        let err = mount(
            Some("none"),
            Path::new("/tmp/solbuild\0test"),
            Some("tmpfs"),
            MsFlags::empty(),
            None::<&str>,
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::Mount { .. }));
    }
}
