mod fetch;
mod init;

pub use fetch::*;
pub use init::*;

use std::path::{Path, PathBuf};

/// The read-only base root filesystem a profile builds on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackingImage {
    pub name: String,
    pub uri: String,
    pub images_dir: PathBuf,
    /// `<images_dir>/<name>.img`
    pub image_path: PathBuf,
    /// `<images_dir>/<name>.img.xz`
    pub image_path_xz: PathBuf,
    /// Where the image is mounted read-write while it is being updated.
    pub root_dir: PathBuf,
}

impl BackingImage {
    pub fn new(
        name: &str,
        uri: &str,
        images_dir: &Path,
        roots_dir: &Path,
    ) -> BackingImage {
        BackingImage {
            name: name.to_string(),
            uri: uri.to_string(),
            images_dir: images_dir.to_path_buf(),
            image_path: images_dir.join(format!("{}.img", name)),
            image_path_xz: images_dir.join(format!("{}.img.xz", name)),
            root_dir: roots_dir.join(name),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.image_path.exists()
    }

    pub fn is_fetched(&self) -> bool {
        self.image_path_xz.exists()
    }
}
