//! # ProcessSupervisor: launch and terminate one child process.
//!
//! Owns at most one [`tokio::process::Child`] at a time. Exit *detection* is
//! not its job (the kernel channel reports that); this type only launches,
//! probes liveness, and drives the graceful-then-forceful termination
//! protocol.

use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

use crate::error::SuperviseError;

use super::descriptor::JobDescriptor;

/// Fixed wait after a forced kill before giving up on the handle.
const FORCED_WAIT: Duration = Duration::from_secs(1);

/// Outcome of the shutdown protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminated {
    /// True when the grace period expired and SIGKILL was sent.
    pub escalated: bool,
}

#[derive(Default)]
pub struct ProcessSupervisor {
    child: Option<Child>,
    /// Raw wait status of the most recent observed exit, kernel encoding.
    exit_code: Option<u32>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns the described command and returns its pid.
    ///
    /// A process must not already be supervised; callers gate launches on
    /// [`is_active`](Self::is_active).
    pub fn launch(&mut self, descriptor: &JobDescriptor) -> Result<u32, SuperviseError> {
        debug_assert!(self.child.is_none(), "launch while a child is supervised");
        self.exit_code = None;

        let child = Command::new(descriptor.command())
            .args(descriptor.argv())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SuperviseError::Launch {
                command: descriptor.command().to_owned(),
                source,
            })?;

        // spawn() only yields a live child; the pid is present.
        let pid = child.id().unwrap_or(0);
        self.child = Some(child);
        Ok(pid)
    }

    /// True while the launched process has not been observed to exit.
    ///
    /// Uses a non-blocking wait, so a child that exited between calls is
    /// reaped here and its status recorded.
    pub fn is_active(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                self.record_exit(status);
                self.child = None;
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(error = %e, "wait on supervised child failed");
                self.child = None;
                false
            }
        }
    }

    /// Pid of the supervised process, if one is active.
    pub fn pid(&mut self) -> Option<u32> {
        if self.is_active() {
            self.child.as_ref().and_then(Child::id)
        } else {
            None
        }
    }

    /// Raw wait status of the last observed exit.
    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    /// Sends SIGTERM (graceful) or SIGKILL (forceful) to the process.
    pub fn kill(&mut self, forceful: bool) {
        let Some(pid) = self.child.as_ref().and_then(Child::id) else {
            return;
        };
        let signal = if forceful {
            Signal::SIGKILL
        } else {
            Signal::SIGTERM
        };
        if let Err(e) = kill(Pid::from_raw(pid as i32), signal) {
            tracing::debug!(pid, signal = %signal, error = %e, "signal delivery failed");
        }
    }

    /// Waits up to `timeout` for the process to exit. Returns true when it
    /// did (or none was running).
    pub async fn wait_completed(&mut self, timeout: Duration) -> bool {
        let Some(child) = self.child.as_mut() else {
            return true;
        };
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                self.record_exit(status);
                self.child = None;
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "wait on supervised child failed");
                self.child = None;
                true
            }
            Err(_) => false,
        }
    }

    /// Graceful-then-forceful termination.
    ///
    /// Sends SIGTERM, grants `grace`, and when the process outlives it sends
    /// SIGKILL exactly once followed by a short fixed wait. Returns whether
    /// escalation happened.
    pub async fn terminate(&mut self, grace: Duration) -> Terminated {
        if !self.is_active() {
            return Terminated { escalated: false };
        }

        self.kill(false);
        if self.wait_completed(grace).await {
            return Terminated { escalated: false };
        }

        self.kill(true);
        if !self.wait_completed(FORCED_WAIT).await {
            tracing::warn!("child survived SIGKILL wait window");
        }
        Terminated { escalated: true }
    }

    fn record_exit(&mut self, status: std::process::ExitStatus) {
        use std::os::unix::process::ExitStatusExt;
        // Keep the kernel wait-status encoding; callers mask the low 16 bits.
        let raw = status.into_raw();
        self.exit_code = Some(raw as u32);
    }
}
