use super::{ChrootCommand, CommandRunner, PidNotifier};
use crate::error::{BuildError, Result};
use log::{debug, info};
use nix::sched::{CloneFlags, setns, unshare};
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

/// Host side network namespace control.
pub trait NetworkControl: Send + Sync {
    /// Move the calling thread into fresh network and UTS namespaces. Children
    /// spawned afterwards inherit them.
    fn drop_networking(&self) -> Result<()>;

    fn set_hostname(&self, hostname: &str) -> Result<()>;

    /// Re-enter the namespaces saved by `drop_networking`.
    fn restore(&self) -> Result<()>;
}

#[derive(Default)]
pub struct HostNetwork {
    saved: Mutex<Option<(File, File)>>,
}

fn net_error(what: &str, e: impl std::fmt::Display) -> BuildError {
    BuildError::NetworkConfig(format!("{}: {}", what, e))
}

impl NetworkControl for HostNetwork {
    fn drop_networking(&self) -> Result<()> {
        let net = File::open("/proc/thread-self/ns/net")
            .map_err(|e| net_error("saving network namespace", e))?;
        let uts = File::open("/proc/thread-self/ns/uts")
            .map_err(|e| net_error("saving uts namespace", e))?;

        unshare(CloneFlags::CLONE_NEWNET | CloneFlags::CLONE_NEWUTS)
            .map_err(|e| net_error("unshare", e))?;

        *self.saved.lock().unwrap_or_else(|e| e.into_inner()) =
            Some((net, uts));
        debug!("Dropped networking");
        Ok(())
    }

    fn set_hostname(&self, hostname: &str) -> Result<()> {
        nix::unistd::sethostname(hostname)
            .map_err(|e| net_error("sethostname", e))
    }

    fn restore(&self) -> Result<()> {
        let saved = self.saved.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some((net, uts)) = saved else {
            return Ok(());
        };
        setns(&net, CloneFlags::CLONE_NEWNET)
            .map_err(|e| net_error("restoring network namespace", e))?;
        setns(&uts, CloneFlags::CLONE_NEWUTS)
            .map_err(|e| net_error("restoring uts namespace", e))?;
        debug!("Restored host networking");
        Ok(())
    }
}

fn hosts_file(hostname: &str) -> String {
    format!(
        "127.0.0.1\tlocalhost {hostname}\n\
         ::1\tlocalhost ip6-localhost ip6-loopback {hostname}\n\
         ff02::1\tip6-allnodes\n\
         ff02::2\tip6-allrouters\n"
    )
}

/// Bring up loopback inside a root whose networking has been dropped, and
/// give it a resolvable hostname.
pub fn configure_networking(
    root: &Path,
    hostname: &str,
    loopback_command: &str,
    runner: &dyn CommandRunner,
    network: &dyn NetworkControl,
    notifier: &dyn PidNotifier,
) -> Result<()> {
    info!("Configuring container networking");

    runner
        .run(notifier, &ChrootCommand::new(root, loopback_command))
        .map_err(|e| net_error("bringing up loopback", e))?;

    let etc = root.join("etc");
    std::fs::create_dir_all(&etc).map_err(|e| net_error("creating etc", e))?;
    std::fs::write(etc.join("hosts"), hosts_file(hostname))
        .map_err(|e| net_error("writing etc/hosts", e))?;

    network.set_hostname(hostname)
}
