use super::PidNotifier;
use crate::error::{BuildError, Result};
use crate::types::Identity;
use log::{debug, trace};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};

/// A shell command to run with its root at `root`.
#[derive(Debug, Clone)]
pub struct ChrootCommand<'a> {
    pub root: &'a Path,
    pub command: String,
    pub identity: Identity,
    /// Attach our stdin, for shells.
    pub interactive: bool,
}

impl<'a> ChrootCommand<'a> {
    pub fn new(root: &'a Path, command: impl Into<String>) -> Self {
        ChrootCommand {
            root,
            command: command.into(),
            identity: Identity::ROOT,
            interactive: false,
        }
    }

    pub fn as_user(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }
}

pub trait CommandRunner: Send + Sync {
    /// Run to completion. The child's pid is reported to `notifier` while it
    /// runs.
    fn run(
        &self,
        notifier: &dyn PidNotifier,
        command: &ChrootCommand<'_>,
    ) -> Result<()>;
}

/// Runs commands through `/bin/sh -c` after chrooting into the sandbox.
pub struct ChrootExecutor;

impl CommandRunner for ChrootExecutor {
    fn run(
        &self,
        notifier: &dyn PidNotifier,
        command: &ChrootCommand<'_>,
    ) -> Result<()> {
        debug!(
            "[{}] {} (as {})",
            command.root.display(),
            command.command,
            command.identity.user
        );

        let root = CString::new(command.root.as_os_str().as_bytes())
            .map_err(|e| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
            })?;

        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(&command.command)
            .env_clear()
            .envs(command.identity.environment())
            .stdin(if command.interactive {
                Stdio::inherit()
            } else {
                Stdio::null()
            });

        // Runs in the forked child, only async-signal-safe calls allowed
        unsafe {
            cmd.pre_exec(move || {
                if libc::chroot(root.as_ptr()) != 0
                    || libc::chdir(c"/".as_ptr()) != 0
                {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = cmd.spawn()?;
        notifier.set_active_pid(child.id() as i32, command.interactive);
        trace!("Started child {}", child.id());

        let status = child.wait();
        notifier.set_active_pid(0, false);
        let status = status?;

        if !status.success() {
            return Err(BuildError::BuildExec {
                command: command.command.clone(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}
