use super::session::{
    ScopedSession, installed_image, load_package, require_root,
};
use crate::config::Config;
use crate::pipeline::{BuildState, build_package};
use crate::sandbox::Overlay;
use crate::util::{Lock, LockMode};
use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

pub fn build(config: &Config, recipe: Option<PathBuf>) -> Result<()> {
    require_root("build packages")?;
    let package = load_package(recipe)?;
    let image = installed_image(config, &config.profile)?;
    let _lock = Lock::image(&config.images_dir, &image.name, LockMode::Shared)?;
    let _session_lock =
        Lock::session(&config.overlay_dir, &config.profile, &package.name)?;

    info!(
        "Building {} ({}) with profile {}",
        package, package.kind, config.profile
    );
    let output_dir =
        std::env::current_dir().context("Reading current directory")?;
    let overlay = Overlay::new(
        image,
        &config.overlay_dir,
        &config.profile,
        &package.name,
    );
    let scoped = ScopedSession::open(config, overlay)?;

    let mut state =
        BuildState::new(scoped.session().clone(), package, output_dir);
    build_package(&mut state)
}
