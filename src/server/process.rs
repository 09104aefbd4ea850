// src/server/process.rs
use crate::error::{Error, Result};
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use serde::Serialize;
use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::{Duration, SystemTime};
use tokio::process::Child;
use tokio::sync::watch;

/// Status of a server entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// No process exists
    Stopped,
    /// A process is being spawned
    Starting,
    /// A process is live
    Running,
    /// The process group has been signalled and is being reaped
    Stopping,
}

impl ServerStatus {
    /// True while the registry holds a live process handle.
    pub fn is_running(self) -> bool {
        matches!(self, ServerStatus::Running | ServerStatus::Stopping)
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerStatus::Stopped => "stopped",
            ServerStatus::Starting => "starting",
            ServerStatus::Running => "running",
            ServerStatus::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// How a server process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitInfo {
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub(crate) fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            signal: status.signal(),
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "killed by signal {}", signal),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

/// Read-only view of a live process, safe to hand out of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    /// Process group ID (equal to the leader's PID)
    pub pgid: i32,
    /// Command line handed to the shell
    pub command_line: String,
    /// When the process was spawned
    pub started_at: SystemTime,
}

/// Record of a spawned process group.
///
/// Owned by the registry entry of its server; the reaper fires `exited`.
#[derive(Debug, Clone)]
pub(crate) struct ProcessHandle {
    generation: u64,
    pgid: i32,
    command_line: String,
    started_at: SystemTime,
    exited: watch::Receiver<Option<ExitInfo>>,
}

impl ProcessHandle {
    pub(crate) fn new(
        generation: u64,
        pgid: i32,
        command_line: String,
        exited: watch::Receiver<Option<ExitInfo>>,
    ) -> Self {
        Self {
            generation,
            pgid,
            command_line,
            started_at: SystemTime::now(),
            exited,
        }
    }

    /// Unique per spawn; lets the reaper tell its handle from a newer one.
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn info(&self) -> ProcessInfo {
        ProcessInfo {
            pgid: self.pgid,
            command_line: self.command_line.clone(),
            started_at: self.started_at,
        }
    }

    /// Sends SIGKILL to the whole process group.
    ///
    /// A group that is already gone counts as killed.
    pub(crate) fn kill_group(&self) -> Result<()> {
        match killpg(Pid::from_raw(self.pgid), Signal::SIGKILL) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => {
                tracing::debug!(pgid = self.pgid, "Process group already gone");
                Ok(())
            }
            Err(e) => Err(Error::Signal(format!(
                "Failed to kill process group {}: {}",
                self.pgid, e
            ))),
        }
    }

    /// Waits until the reaper reports the exit, or `timeout` elapses.
    pub(crate) async fn wait_exited(&self, timeout: Duration) -> Option<ExitInfo> {
        let mut exited = self.exited.clone();
        match tokio::time::timeout(timeout, exited.wait_for(Option::is_some)).await {
            Ok(Ok(exit)) => *exit,
            _ => None,
        }
    }
}

/// A freshly spawned process: the handle for the registry, and the child plus
/// completion sender for its reaper.
pub(crate) struct SpawnedProcess {
    pub(crate) handle: ProcessHandle,
    pub(crate) child: Child,
    pub(crate) exit_tx: watch::Sender<Option<ExitInfo>>,
}
