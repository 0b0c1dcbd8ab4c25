use super::NETWORKING_REQUESTED;
use crate::sandbox::Session;
use crate::types::{BUILD_USER_SHELL, Package};
use anyhow::{Context, Result};
use log::{info, warn};

/// Open an interactive login shell inside a fresh root for `package`.
pub fn chroot_package(session: &Session, package: &Package) -> Result<()> {
    info!("Beginning chroot of {}", package);
    let identity = package.kind.identity();

    session
        .activate(!identity.is_root())
        .with_context(|| format!("{}: activating root", package))?;

    if package.kind.full_sandbox() {
        if package.can_network {
            warn!("{}", NETWORKING_REQUESTED);
        } else {
            session
                .isolate_network()
                .with_context(|| format!("{}: isolating network", package))?;
        }
    }

    info!("Spawning login shell");
    let command =
        format!("/bin/su - {} -s {}", identity.user, BUILD_USER_SHELL);
    session.exec(&command, identity, true)?;
    Ok(())
}
