use super::session::{
    ScopedSession, installed_image, load_package, require_root,
};
use crate::config::Config;
use crate::pipeline::chroot_package;
use crate::sandbox::Overlay;
use crate::util::{Lock, LockMode};
use anyhow::Result;
use std::path::PathBuf;

pub fn chroot(config: &Config, recipe: Option<PathBuf>) -> Result<()> {
    require_root("chroot")?;
    let package = load_package(recipe)?;
    let image = installed_image(config, &config.profile)?;
    let _lock = Lock::image(&config.images_dir, &image.name, LockMode::Shared)?;
    let _session_lock =
        Lock::session(&config.overlay_dir, &config.profile, &package.name)?;

    let overlay = Overlay::new(
        image,
        &config.overlay_dir,
        &config.profile,
        &package.name,
    );
    let scoped = ScopedSession::open(config, overlay)?;
    chroot_package(scoped.session(), &package)
}
