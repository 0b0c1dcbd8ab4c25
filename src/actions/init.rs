use super::session::require_root;
use super::update::update_locked;
use crate::config::{Config, ProfileStore};
use crate::image::{HttpImageFetcher, ensure_images_dir, init_profile};
use crate::util::{Lock, LockMode};
use anyhow::{Context, Result};

pub fn init(config: &Config, profile: &str, update: bool) -> Result<()> {
    require_root("init profiles")?;
    let store = ProfileStore::load(&config.profile_dirs)?;
    let image = store.backing_image(profile, config)?;

    ensure_images_dir(&image).context("Creating images directory")?;
    let _lock =
        Lock::image(&image.images_dir, &image.name, LockMode::Exclusive)?;

    init_profile(profile, &image, &HttpImageFetcher)
        .with_context(|| format!("Initialising profile {}", profile))?;

    if update {
        update_locked(config, image)?;
    }
    Ok(())
}
