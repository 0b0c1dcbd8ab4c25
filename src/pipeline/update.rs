use crate::sandbox::{BASE_COMPONENT, PackageManager, Session};
use anyhow::{Context, Result};
use log::info;

/// Upgrade the backing image in place. `session` must have been created with
/// [`crate::sandbox::Overlay::for_update`].
pub fn update_image(session: &Session) -> Result<()> {
    let name = session.overlay().image.name.clone();
    info!("Updating backing image {}", name);

    session
        .activate(false)
        .with_context(|| format!("{}: activating image", name))?;

    let manager = PackageManager::new(session);
    manager
        .init()
        .and_then(|()| manager.start_bus())
        .with_context(|| format!("{}: starting package manager", name))?;
    manager
        .upgrade()
        .and_then(|()| manager.install_component(BASE_COMPONENT))
        .with_context(|| format!("{}: upgrading", name))?;
    manager
        .stop_bus()
        .with_context(|| format!("{}: stopping service bus", name))?;

    info!("Image {} successfully updated", name);
    Ok(())
}
