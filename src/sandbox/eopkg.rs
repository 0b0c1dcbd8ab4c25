use super::{Session, ensure_eopkg_layout};
use crate::error::{BuildError, Result};
use crate::types::Identity;
use log::{debug, info};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::path::Path;

/// Component every build root must have.
pub const BASE_COMPONENT: &str = "system.devel";

const BUS_PID_FILE: &str = "run/dbus/pid";

fn init_error(e: impl std::fmt::Display) -> BuildError {
    BuildError::PackageManagerInit(e.to_string())
}

fn bus_error(e: impl std::fmt::Display) -> BuildError {
    BuildError::ServiceBus(e.to_string())
}

/// Drives the package manager inside a session's root.
pub struct PackageManager<'a> {
    session: &'a Session,
}

impl<'a> PackageManager<'a> {
    pub fn new(session: &'a Session) -> Self {
        PackageManager { session }
    }

    /// Prepare the database layout, name resolution and the shared package
    /// cache.
    pub fn init(&self) -> Result<()> {
        info!("Initialising package manager");
        let root = self.session.mount_point();
        ensure_eopkg_layout(&root).map_err(init_error)?;

        let etc = root.join("etc");
        std::fs::create_dir_all(&etc).map_err(init_error)?;
        if Path::new("/etc/resolv.conf").exists() {
            // Replaces a dangling symlink into the image's /run
            let _ = std::fs::remove_file(etc.join("resolv.conf"));
            std::fs::copy("/etc/resolv.conf", etc.join("resolv.conf"))
                .map_err(|e| init_error(format!("resolv.conf: {}", e)))?;
        }

        let packages_dir = &self.session.config.packages_dir;
        std::fs::create_dir_all(packages_dir).map_err(init_error)?;
        let target = root.join("var/cache/eopkg/packages");
        self.session
            .bind_into_root(packages_dir, &target, false)
            .map_err(init_error)
    }

    pub fn start_bus(&self) -> Result<()> {
        info!("Starting service bus");
        let root = self.session.mount_point();

        std::fs::create_dir_all(root.join("run/dbus")).map_err(bus_error)?;
        let pid_file = root.join(BUS_PID_FILE);
        if pid_file.exists() {
            debug!("Removing stale {}", pid_file.display());
            std::fs::remove_file(&pid_file).map_err(bus_error)?;
        }

        self.session
            .exec("dbus-uuidgen --ensure", Identity::ROOT, false)
            .map_err(bus_error)?;
        self.session
            .exec("dbus-daemon --system", Identity::ROOT, false)
            .map_err(bus_error)?;
        self.session.set_bus_running(true);
        Ok(())
    }

    pub fn stop_bus(&self) -> Result<()> {
        info!("Stopping service bus");
        stop_service_bus(&self.session.mount_point())?;
        self.session.set_bus_running(false);
        Ok(())
    }

    pub fn upgrade(&self) -> Result<()> {
        info!("Upgrading system base");
        self.session
            .exec("eopkg upgrade -y", Identity::ROOT, false)
            .map_err(|e| BuildError::Upgrade(e.to_string()))
    }

    pub fn install_component(&self, component: &str) -> Result<()> {
        info!("Asserting {} component installation", component);
        self.session
            .exec(
                &format!("eopkg install -c {} -y", component),
                Identity::ROOT,
                false,
            )
            .map_err(|e| BuildError::ComponentInstall {
                component: component.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Terminate the bus recorded in `<root>/run/dbus/pid`. A missing pid file
/// means there is nothing to stop.
pub fn stop_service_bus(root: &Path) -> Result<()> {
    let pid_file = root.join(BUS_PID_FILE);
    let content = match std::fs::read_to_string(&pid_file) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No service bus pid file in {}", root.display());
            return Ok(());
        }
        Err(e) => return Err(bus_error(e)),
    };

    // 0 and negative pids address process groups, never a single bus
    let pid = content
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|pid| *pid > 0)
        .ok_or_else(|| {
            BuildError::ServiceBus(format!(
                "invalid pid '{}' in {}",
                content.trim(),
                pid_file.display()
            ))
        })?;

    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => debug!("Sent SIGTERM to service bus {}", pid),
        Err(nix::errno::Errno::ESRCH) => {
            debug!("Service bus {} already gone", pid)
        }
        Err(e) => {
            return Err(BuildError::ServiceBus(format!(
                "killing {}: {}",
                pid, e
            )));
        }
    }

    std::fs::remove_file(&pid_file).map_err(bus_error)
}
