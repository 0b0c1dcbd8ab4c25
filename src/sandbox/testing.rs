//! Recording stand-ins for the host seams, shared by the session and
//! pipeline tests.

use super::{
    ChrootCommand, CommandRunner, Host, NetworkControl, Overlay, PidNotifier,
    Session, SourceFetcher,
};
use crate::config::{
    Config, DEFAULT_HOSTNAME, DEFAULT_IMAGE_BASE_URI, DEFAULT_LOOPBACK_COMMAND,
    DEFAULT_PROFILE,
};
use crate::error::{BuildError, Result};
use crate::image::BackingImage;
use crate::util::MountManager;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Every host side effect, in the order it happened.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<String>>,
}

impl EventLog {
    pub fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.starts_with(prefix))
            .collect()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

/// Keeps its own mount table so stale mount cleanup can be observed.
pub struct FakeMounts {
    log: Arc<EventLog>,
    live: Mutex<Vec<PathBuf>>,
}

impl FakeMounts {
    fn attach(&self, target: &Path) {
        self.live.lock().unwrap().push(target.to_path_buf());
    }
}

impl MountManager for FakeMounts {
    fn mount_fs(
        &self,
        fstype: &str,
        _source: &str,
        target: &Path,
        _data: Option<&str>,
    ) -> Result<()> {
        self.log.push(format!("mount {} {}", fstype, target.display()));
        self.attach(target);
        Ok(())
    }

    fn bind(
        &self,
        source: &Path,
        target: &Path,
        read_only: bool,
    ) -> Result<()> {
        let mode = if read_only { "ro" } else { "rw" };
        self.log.push(format!(
            "bind {} {} {}",
            mode,
            source.display(),
            target.display()
        ));
        self.attach(target);
        Ok(())
    }

    fn loop_mount(
        &self,
        image: &Path,
        target: &Path,
        read_only: bool,
    ) -> Result<()> {
        let mode = if read_only { "ro" } else { "rw" };
        self.log.push(format!(
            "loop {} {} {}",
            mode,
            image.display(),
            target.display()
        ));
        self.attach(target);
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        self.log.push(format!("umount {}", target.display()));
        let mut live = self.live.lock().unwrap();
        if let Some(at) = live.iter().rposition(|t| t == target) {
            live.remove(at);
        }
        Ok(())
    }

    fn mounts_under(&self, base: &Path) -> Result<Vec<PathBuf>> {
        let mut under: Vec<PathBuf> = self
            .live
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.starts_with(base))
            .cloned()
            .collect();
        under.sort_by(|a, b| b.cmp(a));
        under.dedup();
        Ok(under)
    }
}

/// Records each command as `run <user> <command>`. Commands containing
/// `fail_on` exit non-zero.
pub struct FakeRunner {
    log: Arc<EventLog>,
    fail_on: Mutex<Option<String>>,
}

impl FakeRunner {
    pub fn fail_on(&self, needle: &str) {
        *self.fail_on.lock().unwrap() = Some(needle.to_string());
    }
}

impl CommandRunner for FakeRunner {
    fn run(
        &self,
        _notifier: &dyn PidNotifier,
        command: &ChrootCommand<'_>,
    ) -> Result<()> {
        self.log.push(format!(
            "run {} {}",
            command.identity.user, command.command
        ));
        let fail_on = self.fail_on.lock().unwrap().clone();
        if fail_on.is_some_and(|needle| command.command.contains(&needle)) {
            return Err(BuildError::BuildExec {
                command: command.command.clone(),
                status: "exit status: 1".into(),
            });
        }
        Ok(())
    }
}

pub struct FakeNetwork {
    log: Arc<EventLog>,
}

impl NetworkControl for FakeNetwork {
    fn drop_networking(&self) -> Result<()> {
        self.log.push("net drop".into());
        Ok(())
    }

    fn set_hostname(&self, hostname: &str) -> Result<()> {
        self.log.push(format!("net hostname {}", hostname));
        Ok(())
    }

    fn restore(&self) -> Result<()> {
        self.log.push("net restore".into());
        Ok(())
    }
}

/// Writes a fixed body for every source.
pub struct FakeSources {
    log: Arc<EventLog>,
    body: Vec<u8>,
}

impl SourceFetcher for FakeSources {
    fn fetch(&self, uri: &str, dest: &Path) -> Result<()> {
        self.log.push(format!("fetch {}", uri));
        std::fs::write(dest, &self.body)?;
        Ok(())
    }
}

/// A host made of fakes, plus handles to inspect them.
pub struct FakeHost {
    pub log: Arc<EventLog>,
    pub runner: Arc<FakeRunner>,
    pub host: Host,
}

impl FakeHost {
    pub fn new() -> FakeHost {
        let log = Arc::new(EventLog::default());
        let runner = Arc::new(FakeRunner {
            log: log.clone(),
            fail_on: Mutex::new(None),
        });
        let host = Host {
            mounts: Arc::new(FakeMounts {
                log: log.clone(),
                live: Mutex::new(Vec::new()),
            }),
            runner: runner.clone(),
            network: Arc::new(FakeNetwork { log: log.clone() }),
            sources: Arc::new(FakeSources {
                log: log.clone(),
                body: b"abc".to_vec(),
            }),
        };
        FakeHost { log, runner, host }
    }
}

/// A config whose directories all live under `root`.
pub fn test_config(root: &Path) -> Config {
    Config {
        log_level: log::LevelFilter::Info,
        profile: DEFAULT_PROFILE.to_string(),
        images_dir: root.join("images"),
        roots_dir: root.join("roots"),
        image_base_uri: DEFAULT_IMAGE_BASE_URI.to_string(),
        overlay_dir: root.join("overlay"),
        sources_dir: root.join("sources"),
        packages_dir: root.join("packages"),
        profile_dirs: vec![root.join("profiles")],
        loopback_command: DEFAULT_LOOPBACK_COMMAND.to_string(),
        hostname: DEFAULT_HOSTNAME.to_string(),
        sources: HashMap::new(),
    }
}

pub fn test_image(config: &Config) -> BackingImage {
    BackingImage::new(
        &config.profile,
        "https://example.com/main-x86_64.img.xz",
        &config.images_dir,
        &config.roots_dir,
    )
}

/// A session building `package_name` on fakes rooted at `root`.
pub fn test_session(
    root: &Path,
    package_name: &str,
) -> (Arc<Session>, FakeHost) {
    let fakes = FakeHost::new();
    let config = test_config(root);
    let overlay = Overlay::new(
        test_image(&config),
        &config.overlay_dir,
        &config.profile,
        package_name,
    );
    (Session::new(config, fakes.host.clone(), overlay), fakes)
}
