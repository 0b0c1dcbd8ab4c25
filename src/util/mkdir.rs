use crate::error::{BuildError, Result};
use nix::unistd::{Gid, Uid, chown};
use std::path::Path;

/* Makes the directory if it doesn't exist and hands it to the given owner.
 * Fails if something other than a directory is already at the path. */
pub fn mkdir_owned(path: &Path, uid: Uid, gid: Gid) -> Result<()> {
    if path.symlink_metadata().is_ok() && !path.is_dir() {
        return Err(BuildError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} exists but is not a directory", path.display()),
        )));
    }

    std::fs::create_dir_all(path)?;
    chown(path, Some(uid), Some(gid)).map_err(std::io::Error::from)?;
    Ok(())
}
