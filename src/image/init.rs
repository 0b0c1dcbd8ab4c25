use super::{BackingImage, ImageFetcher};
use crate::error::Result;
use crate::outln;
use log::{debug, info};
use std::os::unix::fs::DirBuilderExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    AlreadyInstalled,
    Initialised,
}

/// Create the images directory, which also holds the image locks.
pub fn ensure_images_dir(image: &BackingImage) -> Result<()> {
    if !image.images_dir.exists() {
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&image.images_dir)?;
        debug!("Created images directory {}", image.images_dir.display());
    }
    Ok(())
}

/// Fetch and decompress the backing image for `profile` unless it is already
/// installed.
pub fn init_profile(
    profile: &str,
    image: &BackingImage,
    fetcher: &dyn ImageFetcher,
) -> Result<InitOutcome> {
    if image.is_installed() {
        outln!("'{}' has already been initialised", profile);
        return Ok(InitOutcome::AlreadyInstalled);
    }

    ensure_images_dir(image)?;
    if !image.is_fetched() {
        fetcher.fetch(&image.uri, &image.image_path_xz)?;
    }

    fetcher.decompress(&image.image_path_xz)?;

    info!("Profile '{}' successfully initialised", profile);
    Ok(InitOutcome::Initialised)
}
