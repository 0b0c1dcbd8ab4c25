use super::session::{ScopedSession, installed_image, require_root};
use crate::config::Config;
use crate::image::BackingImage;
use crate::pipeline::update_image;
use crate::sandbox::Overlay;
use crate::util::{Lock, LockMode};
use anyhow::Result;

pub fn update(config: &Config, profile: &str) -> Result<()> {
    require_root("update profiles")?;
    let image = installed_image(config, profile)?;
    let _lock =
        Lock::image(&image.images_dir, &image.name, LockMode::Exclusive)?;
    update_locked(config, image)
}

/// Update `image`, whose exclusive lock the caller holds.
pub(super) fn update_locked(
    config: &Config,
    image: BackingImage,
) -> Result<()> {
    let scoped = ScopedSession::open(config, Overlay::for_update(image))?;
    update_image(scoped.session())
}
