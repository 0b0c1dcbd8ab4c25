use crate::config::{Config, ProfileStore};
use crate::error::BuildError;
use crate::image::BackingImage;
use crate::recipe::{FileRecipeLoader, RecipeLoader, find_likely_recipe};
use crate::sandbox::{
    Host, InterruptGuard, Overlay, Session, SessionHandle,
    install_interrupt_handler,
};
use crate::types::Package;
use anyhow::{Context, Result, anyhow};
use nix::unistd::geteuid;
use std::path::PathBuf;
use std::sync::Arc;

pub(super) fn require_root(action: &'static str) -> Result<(), BuildError> {
    if !geteuid().is_root() {
        return Err(BuildError::Privilege { action });
    }
    Ok(())
}

/// The backing image of `profile`, which must already be initialised.
pub(super) fn installed_image(
    config: &Config,
    profile: &str,
) -> Result<BackingImage> {
    let store = ProfileStore::load(&config.profile_dirs)?;
    store.require_installed(profile, config).map_err(|e| match e {
        BuildError::ProfileNotInstalled(_) => {
            anyhow!("{}: Did you forget to init?", e)
        }
        e => e.into(),
    })
}

/// Parse `recipe`, or the recipe in the current directory.
pub(super) fn load_package(recipe: Option<PathBuf>) -> Result<Package> {
    let recipe = match recipe {
        Some(recipe) => recipe,
        None => {
            let cwd = std::env::current_dir()
                .context("Reading current directory")?;
            find_likely_recipe(&cwd).ok_or_else(|| {
                anyhow!("No recipe found in {}", cwd.display())
            })?
        }
    };
    Ok(FileRecipeLoader.load(&recipe)?)
}

/// A session on the real host, reaped when dropped or when a signal
/// arrives, whichever happens first.
pub(super) struct ScopedSession {
    handle: SessionHandle,
    // Dropped after `handle` so signals stay covered while it reaps
    _interrupts: InterruptGuard,
}

impl ScopedSession {
    pub fn open(config: &Config, overlay: Overlay) -> Result<ScopedSession> {
        let session = Session::new(config.clone(), Host::system(), overlay);
        let interrupts = install_interrupt_handler(session.clone())?;
        Ok(ScopedSession {
            handle: SessionHandle::new(session),
            _interrupts: interrupts,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        self.handle.session()
    }
}
