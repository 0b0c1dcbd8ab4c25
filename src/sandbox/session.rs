use super::{
    ChrootCommand, ChrootExecutor, CommandRunner, HostNetwork,
    HttpSourceFetcher, NetworkControl, Overlay, ProcessSupervisor,
    SourceFetcher, configure_networking, ensure_build_user,
    ensure_eopkg_layout, stop_service_bus,
};
use crate::config::Config;
use crate::error::{BuildError, Result};
use crate::types::Identity;
use crate::util::{KernelMounts, MountManager};
use log::{debug, error, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// The operating system seams a session works through.
#[derive(Clone)]
pub struct Host {
    pub mounts: Arc<dyn MountManager>,
    pub runner: Arc<dyn CommandRunner>,
    pub network: Arc<dyn NetworkControl>,
    pub sources: Arc<dyn SourceFetcher>,
}

impl Host {
    pub fn system() -> Host {
        Host {
            mounts: Arc::new(KernelMounts),
            runner: Arc::new(ChrootExecutor),
            network: Arc::new(HostNetwork::default()),
            sources: Arc::new(HttpSourceFetcher),
        }
    }
}

/// One sandbox session: the overlay, the child supervisor and the flags the
/// reaper needs to undo everything exactly once.
pub struct Session {
    pub config: Config,
    pub host: Host,
    supervisor: ProcessSupervisor,
    overlay: Mutex<Overlay>,
    /// Held for the whole of a reap, so a racing second caller only returns
    /// once everything is undone.
    reaping: Mutex<()>,
    released: AtomicBool,
    bus_running: AtomicBool,
    network_isolated: AtomicBool,
}

impl Session {
    pub fn new(config: Config, host: Host, overlay: Overlay) -> Arc<Session> {
        Arc::new(Session {
            config,
            host,
            supervisor: ProcessSupervisor::default(),
            overlay: Mutex::new(overlay),
            reaping: Mutex::new(()),
            released: AtomicBool::new(false),
            bus_running: AtomicBool::new(false),
            network_isolated: AtomicBool::new(false),
        })
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn overlay(&self) -> MutexGuard<'_, Overlay> {
        self.overlay.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn mount_point(&self) -> PathBuf {
        self.overlay().mount_point.clone()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// The overlay, unless the session has been reaped. Anything mounted
    /// while this guard is held is seen by the reaper.
    fn live_overlay(&self) -> Result<MutexGuard<'_, Overlay>> {
        let overlay = self.overlay();
        if self.is_released() {
            return Err(BuildError::mount(
                &overlay.mount_point,
                io::Error::other("session has already been torn down"),
            ));
        }
        Ok(overlay)
    }

    /// Clean up after any previous session and mount a fresh root. The build
    /// user is only needed by recipes that build unprivileged.
    pub fn activate(&self, with_build_user: bool) -> Result<()> {
        let mounts = self.host.mounts.as_ref();
        let mut overlay = self.live_overlay()?;
        overlay.clean_existing(mounts)?;
        overlay.activate(mounts)?;

        ensure_eopkg_layout(&overlay.mount_point)?;
        if with_build_user {
            ensure_build_user(&overlay.mount_point)?;
        }
        Ok(())
    }

    pub fn exec(
        &self,
        command: &str,
        identity: Identity,
        interactive: bool,
    ) -> Result<()> {
        let root = self.live_overlay()?.mount_point.clone();
        let mut command = ChrootCommand::new(&root, command).as_user(identity);
        if interactive {
            command = command.interactive();
        }
        self.host.runner.run(&self.supervisor, &command)
    }

    /// Bind `source` onto `target` inside the root and record it for
    /// teardown.
    pub fn bind_into_root(
        &self,
        source: &Path,
        target: &Path,
        read_only: bool,
    ) -> Result<()> {
        let mut overlay = self.live_overlay()?;
        self.host.mounts.bind(source, target, read_only)?;
        overlay.add_extra_mount(target.to_path_buf());
        Ok(())
    }

    pub fn set_bus_running(&self, running: bool) {
        self.bus_running.store(running, Ordering::SeqCst);
    }

    pub fn bus_running(&self) -> bool {
        self.bus_running.load(Ordering::SeqCst)
    }

    /// Drop networking, then bring up loopback inside the root.
    pub fn isolate_network(&self) -> Result<()> {
        self.host.network.drop_networking()?;
        self.network_isolated.store(true, Ordering::SeqCst);

        configure_networking(
            &self.mount_point(),
            &self.config.hostname,
            &self.config.loopback_command,
            self.host.runner.as_ref(),
            self.host.network.as_ref(),
            &self.supervisor,
        )
    }

    pub fn network_isolated(&self) -> bool {
        self.network_isolated.load(Ordering::SeqCst)
    }

    /// Undo the session: terminate the child, stop the service bus, unmount
    /// everything and restore host networking. Only the first call does
    /// anything, later callers wait for it to finish.
    pub fn reap(&self) {
        let _reaping = self.reaping.lock().unwrap_or_else(|e| e.into_inner());
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Reaping session");

        self.supervisor.terminate_active();

        let mut overlay = self.overlay();
        if self.bus_running.swap(false, Ordering::SeqCst) {
            if let Err(e) = stop_service_bus(&overlay.mount_point) {
                warn!("Failed to stop service bus: {}", e);
            }
        }

        let failures = overlay.teardown(self.host.mounts.as_ref());
        if failures > 0 {
            error!("{} mounts could not be removed", failures);
        }
        drop(overlay);

        if self.network_isolated.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.host.network.restore() {
                error!("Failed to restore host networking: {}", e);
            }
        }
    }
}

/// Reaps its session when dropped, so every return path tears down.
pub struct SessionHandle {
    session: Arc<Session>,
}

impl SessionHandle {
    pub fn new(session: Arc<Session>) -> SessionHandle {
        SessionHandle { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl std::ops::Deref for SessionHandle {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.session.reap();
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{
        FakeHost, test_config, test_image, test_session,
    };
    use super::super::{
        PackageManager, PidNotifier, SignalOutcome, handle_signal,
    };
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Mounts instantly, takes a while to unmount.
    #[derive(Default)]
    struct SlowMounts {
        unmounted: AtomicUsize,
    }

    impl MountManager for SlowMounts {
        fn mount_fs(
            &self,
            _fstype: &str,
            _source: &str,
            _target: &Path,
            _data: Option<&str>,
        ) -> Result<()> {
            Ok(())
        }

        fn bind(&self, _: &Path, _: &Path, _: bool) -> Result<()> {
            Ok(())
        }

        fn loop_mount(&self, _: &Path, _: &Path, _: bool) -> Result<()> {
            Ok(())
        }

        fn unmount(&self, _target: &Path) -> Result<()> {
            std::thread::sleep(Duration::from_millis(50));
            self.unmounted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn mounts_under(&self, _base: &Path) -> Result<Vec<PathBuf>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_teardown_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let (session, fakes) = test_session(dir.path(), "nano");
        session.activate(false).unwrap();
        let mounted = fakes.log.matching("mount ").len()
            + fakes.log.matching("loop ").len();
        assert_eq!(mounted, 7);

        session.reap();
        session.reap();
        drop(SessionHandle::new(session.clone()));

        assert_eq!(fakes.log.matching("umount ").len(), mounted);
        assert!(session.is_released());
        assert!(!session.overlay().is_active());
    }

    #[test]
    fn test_teardown_once_across_threads() {
        let dir = tempfile::tempdir().unwrap();
        let (session, fakes) = test_session(dir.path(), "nano");
        session.activate(false).unwrap();

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let session = session.clone();
                std::thread::spawn(move || session.reap())
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(fakes.log.matching("umount ").len(), 7);
    }

    #[test]
    fn test_racing_reap_waits_for_teardown() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mounts = Arc::new(SlowMounts::default());
        let host = Host {
            mounts: mounts.clone(),
            ..FakeHost::new().host
        };
        let overlay =
            Overlay::new(test_image(&config), &config.overlay_dir, "p", "nano");
        let session = Session::new(config, host, overlay);
        session.activate(false).unwrap();

        let first = {
            let session = session.clone();
            std::thread::spawn(move || session.reap())
        };
        std::thread::sleep(Duration::from_millis(20));
        session.reap();

        assert_eq!(mounts.unmounted.load(Ordering::SeqCst), 7);
        first.join().unwrap();
    }

    #[test]
    fn test_released_session_refuses_new_work() {
        let dir = tempfile::tempdir().unwrap();
        let (session, fakes) = test_session(dir.path(), "nano");
        session.activate(false).unwrap();
        session.reap();
        let events = fakes.log.events().len();

        let err = session
            .bind_into_root(dir.path(), &session.mount_point().join("x"), true)
            .unwrap_err();
        assert!(matches!(err, BuildError::Mount { .. }));
        assert!(session.exec("true", Identity::ROOT, false).is_err());
        assert!(session.activate(false).is_err());

        assert_eq!(fakes.log.events().len(), events);
        assert!(session.overlay().extra_mounts().is_empty());
    }

    #[test]
    fn test_extra_mounts_removed_first_in_reverse() {
        let dir = tempfile::tempdir().unwrap();
        let (session, fakes) = test_session(dir.path(), "nano");
        session.activate(false).unwrap();
        let root = session.mount_point();
        for name in ["a", "b", "c"] {
            session.overlay().add_extra_mount(root.join(name));
        }

        session.reap();

        let unmounts = fakes.log.matching("umount ");
        let expected: Vec<String> = ["c", "b", "a"]
            .iter()
            .map(|n| format!("umount {}", root.join(n).display()))
            .collect();
        assert_eq!(unmounts[..3], expected[..]);
        // The image is the first core mount, so it goes last
        assert_eq!(
            unmounts.last().unwrap(),
            &format!(
                "umount {}",
                session.overlay().lower_dir.display()
            )
        );
    }

    #[test]
    fn test_second_activate_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _fakes) = test_session(dir.path(), "nano");
        session.overlay().activate(session.host.mounts.as_ref()).unwrap();
        let err = session
            .overlay()
            .activate(session.host.mounts.as_ref())
            .unwrap_err();
        assert!(matches!(err, crate::error::BuildError::Mount { .. }));
    }

    #[test]
    fn test_isolation_drops_before_configuring() {
        let dir = tempfile::tempdir().unwrap();
        let (session, fakes) = test_session(dir.path(), "nano");
        session.activate(true).unwrap();
        session.isolate_network().unwrap();

        let drop_at = fakes.log.position("net drop").unwrap();
        let loopback = format!("run root {}", session.config.loopback_command);
        let loopback_at = fakes.log.position(&loopback).unwrap();
        assert!(drop_at < loopback_at);
        assert!(fakes.log.position("net hostname solbuild").unwrap() > drop_at);
        let hosts =
            std::fs::read_to_string(session.mount_point().join("etc/hosts"))
                .unwrap();
        assert!(hosts.contains("solbuild"));

        session.reap();
        assert_eq!(fakes.log.matching("net restore").len(), 1);
        assert!(fakes.log.position("net restore").unwrap() > loopback_at);
    }

    #[test]
    fn test_reap_without_isolation_leaves_network_alone() {
        let dir = tempfile::tempdir().unwrap();
        let (session, fakes) = test_session(dir.path(), "nano");
        session.activate(false).unwrap();
        session.reap();
        assert!(fakes.log.matching("net ").is_empty());
    }

    #[test]
    fn test_interrupt_terminates_child_and_unwinds() {
        let dir = tempfile::tempdir().unwrap();
        let (session, fakes) = test_session(dir.path(), "nano");
        session.activate(true).unwrap();
        session.isolate_network().unwrap();

        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        session.supervisor().set_active_pid(child.id() as i32, false);

        let outcome = handle_signal(&session, libc::SIGTERM);
        assert_eq!(outcome, SignalOutcome::Exit(143));

        assert_eq!(child.wait().unwrap().signal(), Some(libc::SIGTERM));
        assert_eq!(fakes.log.matching("umount ").len(), 7);
        assert_eq!(fakes.log.matching("net restore").len(), 1);
    }

    #[test]
    fn test_reap_stops_running_bus() {
        let dir = tempfile::tempdir().unwrap();
        let (session, fakes) = test_session(dir.path(), "nano");
        session.activate(false).unwrap();
        PackageManager::new(&session).start_bus().unwrap();
        assert!(session.bus_running());

        let mut bus = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        std::fs::write(
            session.mount_point().join("run/dbus/pid"),
            bus.id().to_string(),
        )
        .unwrap();

        session.reap();
        assert_eq!(bus.wait().unwrap().signal(), Some(libc::SIGTERM));
        assert!(!session.bus_running());
        assert!(
            fakes
                .log
                .position("run root dbus-daemon --system")
                .is_some()
        );
    }

    #[test]
    fn test_package_manager_binds_package_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (session, fakes) = test_session(dir.path(), "nano");
        session.activate(false).unwrap();
        PackageManager::new(&session).init().unwrap();

        let target = session.mount_point().join("var/cache/eopkg/packages");
        assert_eq!(session.overlay().extra_mounts(), &[target.clone()]);
        assert_eq!(
            fakes.log.matching("bind rw "),
            vec![format!(
                "bind rw {} {}",
                session.config.packages_dir.display(),
                target.display()
            )]
        );
        assert!(session.config.packages_dir.is_dir());
    }
}
