use super::Session;
use anyhow::{Context, Result};
use log::{debug, warn};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread::JoinHandle;

/// Told about the child currently running inside the sandbox.
pub trait PidNotifier: Send + Sync {
    /// `pid` of 0 means nothing is running.
    fn set_active_pid(&self, pid: i32, interactive: bool);
}

/// Tracks the active child so an interrupt can terminate it before the
/// sandbox is torn down.
#[derive(Default)]
pub struct ProcessSupervisor {
    active_pid: AtomicI32,
    interactive: AtomicBool,
}

impl ProcessSupervisor {
    pub fn active_pid(&self) -> i32 {
        self.active_pid.load(Ordering::SeqCst)
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive.load(Ordering::SeqCst)
    }

    /// Send SIGTERM to the active child, if any.
    pub fn terminate_active(&self) {
        let pid = self.active_pid();
        if pid <= 0 {
            return;
        }
        debug!("Terminating child {}", pid);
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => warn!("Failed to terminate child {}: {}", pid, e),
        }
    }
}

impl PidNotifier for ProcessSupervisor {
    fn set_active_pid(&self, pid: i32, interactive: bool) {
        self.interactive.store(interactive && pid > 0, Ordering::SeqCst);
        self.active_pid.store(pid, Ordering::SeqCst);
    }
}

fn signal_name(signal: i32) -> &'static str {
    Signal::try_from(signal)
        .map(|s| s.as_str())
        .unwrap_or("signal")
}

/// Keeps the interrupt reaper alive. Dropping it stops listening for signals.
pub struct InterruptGuard {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

/// What the reaper thread does once a signal has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// Left to the interactive shell in the foreground.
    Ignored,
    /// The session has been reaped. Exit with this status.
    Exit(i32),
}

/// Terminate the active child and reap the session, unless `signal` is a
/// SIGINT meant for an interactive shell.
pub fn handle_signal(session: &Session, signal: i32) -> SignalOutcome {
    if signal == SIGINT && session.supervisor().is_interactive() {
        debug!("Leaving SIGINT to the interactive shell");
        return SignalOutcome::Ignored;
    }

    warn!("Received {}, cleaning up", signal_name(signal));
    session.supervisor().terminate_active();
    session.reap();
    SignalOutcome::Exit(128 + signal)
}

/// Watch for SIGINT, SIGTERM and SIGHUP on a dedicated thread. On delivery
/// the session is handled by [`handle_signal`] and the process dies the way
/// the signal would have killed it.
pub fn install_interrupt_handler(
    session: Arc<Session>,
) -> Result<InterruptGuard> {
    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])
        .context("Installing signal handlers")?;
    let handle = signals.handle();

    let thread = std::thread::Builder::new()
        .name("reaper".into())
        .spawn(move || {
            for signal in signals.forever() {
                let SignalOutcome::Exit(status) =
                    handle_signal(&session, signal)
                else {
                    continue;
                };

                if let Err(e) =
                    signal_hook::low_level::emulate_default_handler(signal)
                {
                    warn!("Failed to re-raise {}: {}", signal_name(signal), e);
                }
                std::process::exit(status);
            }
        })
        .context("Spawning reaper thread")?;

    Ok(InterruptGuard {
        handle,
        thread: Some(thread),
    })
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
