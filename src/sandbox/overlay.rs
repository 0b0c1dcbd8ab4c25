use crate::image::BackingImage;
use std::path::{Path, PathBuf};

/// How the root is assembled on the mount point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layering {
    /// Writable overlayfs on top of the read-only image. Used for builds.
    Overlay,
    /// The image itself mounted read-write. Used to update it.
    ImageDirect,
}

/// The mount state of one sandbox session.
#[derive(Debug)]
pub struct Overlay {
    pub image: BackingImage,
    pub name: String,
    pub layering: Layering,
    /// `<overlay_dir>/<profile>/<package>`
    pub base_dir: PathBuf,
    pub work_dir: PathBuf,
    pub upper_dir: PathBuf,
    pub mount_point: PathBuf,
    /// Where the image itself is mounted. Private to the session for
    /// builds, so sessions sharing an image never touch each other's mount.
    pub lower_dir: PathBuf,
    pub(super) core_mounts: Vec<PathBuf>,
    pub(super) extra_mounts: Vec<PathBuf>,
    pub(super) active: bool,
}

impl Overlay {
    pub fn new(
        image: BackingImage,
        overlay_dir: &Path,
        profile: &str,
        package_name: &str,
    ) -> Overlay {
        let base_dir = overlay_dir.join(profile).join(package_name);
        Overlay {
            lower_dir: base_dir.join("image"),
            image,
            name: package_name.to_string(),
            layering: Layering::Overlay,
            work_dir: base_dir.join("work"),
            upper_dir: base_dir.join("tmp"),
            mount_point: base_dir.join("union"),
            base_dir,
            core_mounts: Vec::new(),
            extra_mounts: Vec::new(),
            active: false,
        }
    }

    /// Mount the image read-write at its root dir, without an overlay.
    pub fn for_update(image: BackingImage) -> Overlay {
        let root = image.root_dir.clone();
        Overlay {
            name: image.name.clone(),
            image,
            layering: Layering::ImageDirect,
            base_dir: root.clone(),
            work_dir: root.clone(),
            upper_dir: root.clone(),
            mount_point: root.clone(),
            lower_dir: root,
            core_mounts: Vec::new(),
            extra_mounts: Vec::new(),
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Record a mount made inside the root so teardown unmounts it first.
    pub fn add_extra_mount(&mut self, target: PathBuf) {
        self.extra_mounts.push(target);
    }

    pub fn extra_mounts(&self) -> &[PathBuf] {
        &self.extra_mounts
    }

    /// Host path of a path inside the root.
    pub fn path_in_root(&self, internal: impl AsRef<Path>) -> PathBuf {
        let internal = internal.as_ref();
        self.mount_point
            .join(internal.strip_prefix("/").unwrap_or(internal))
    }
}
