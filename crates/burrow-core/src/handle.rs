//! Handles to supervised processes.

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use burrow_common::error::{BurrowError, Result};
use chrono::{DateTime, Utc};
use tokio::process::{Child, ChildStdin};
use tokio::time::Instant;

use crate::spec::exit_code_of;

/// How often liveness is re-checked while waiting for an exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to wait for the kernel to deliver SIGKILL.
const KILL_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Supervisor-local identifier of a spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub(crate) u64);

impl HandleId {
    /// Returns the numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// How a termination request settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// The process was already dead when termination was requested.
    AlreadyExited(i32),
    /// The process exited within the grace period.
    Exited(i32),
    /// The process had to be killed.
    Killed(i32),
}

impl TerminationOutcome {
    /// Exit code recorded for the process.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::AlreadyExited(code) | Self::Exited(code) | Self::Killed(code) => code,
        }
    }
}

#[derive(Debug)]
struct ChildSlot {
    child: Child,
    exit_code: Option<i32>,
}

/// A live (or recently dead) supervised process.
///
/// The underlying child is killed when the last handle is dropped.
#[derive(Debug)]
pub struct ProcessHandle {
    id: HandleId,
    pid: u32,
    command: String,
    started_at: DateTime<Utc>,
    slot: Mutex<ChildSlot>,
    stdin: Mutex<Option<ChildStdin>>,
    termination_requested: AtomicBool,
}

impl ProcessHandle {
    pub(crate) fn new(id: HandleId, mut child: Child, command: String) -> Result<Self> {
        let pid = child.id().ok_or_else(|| BurrowError::Launch {
            environment: command.clone(),
            reason: "process exited before its pid could be read".into(),
        })?;
        let stdin = child.stdin.take();
        Ok(Self {
            id,
            pid,
            command,
            started_at: Utc::now(),
            slot: Mutex::new(ChildSlot {
                child,
                exit_code: None,
            }),
            stdin: Mutex::new(stdin),
            termination_requested: AtomicBool::new(false),
        })
    }

    /// Supervisor-local identifier.
    #[must_use]
    pub const fn id(&self) -> HandleId {
        self.id
    }

    /// OS process id.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Command line the process was started with.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// When the process was spawned.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether someone asked this process to terminate.
    #[must_use]
    pub fn termination_requested(&self) -> bool {
        self.termination_requested.load(Ordering::SeqCst)
    }

    /// Whether the process is still running. Reaps it if it has exited.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.poll_exit().is_none()
    }

    /// Exit code if the process has exited, `None` while it runs.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.poll_exit()
    }

    /// Non-blocking reap. Caches the exit code once observed.
    pub(crate) fn poll_exit(&self) -> Option<i32> {
        let mut slot = match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(code) = slot.exit_code {
            return Some(code);
        }
        match slot.child.try_wait() {
            Ok(Some(status)) => {
                let code = exit_code_of(status);
                slot.exit_code = Some(code);
                tracing::debug!(handle = %self.id, pid = self.pid, code, "process reaped");
                Some(code)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(handle = %self.id, pid = self.pid, error = %e, "wait failed, treating process as gone");
                slot.exit_code = Some(-1);
                Some(-1)
            }
        }
    }

    /// Waits until the process exits or `timeout` elapses.
    pub async fn wait_timeout(&self, timeout: Duration) -> Option<i32> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(code) = self.poll_exit() {
                return Some(code);
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
    }

    /// Waits until the process exits.
    pub async fn wait(&self) -> i32 {
        loop {
            if let Some(code) = self.poll_exit() {
                return code;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
    }

    /// Terminates the process.
    ///
    /// A graceful termination closes stdin and sends SIGTERM, then waits up
    /// to `grace` before escalating to SIGKILL. A forced termination sends
    /// SIGKILL immediately. Either way the process is reaped before this
    /// returns successfully.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::TerminationTimeout`] if the process is still
    /// alive after SIGKILL.
    pub async fn terminate(&self, graceful: bool, grace: Duration) -> Result<TerminationOutcome> {
        self.termination_requested.store(true, Ordering::SeqCst);
        if let Some(code) = self.poll_exit() {
            return Ok(TerminationOutcome::AlreadyExited(code));
        }

        if graceful {
            self.close_stdin();
            self.send_sigterm();
            if let Some(code) = self.wait_timeout(grace).await {
                tracing::info!(pid = self.pid, code, "process exited after SIGTERM");
                return Ok(TerminationOutcome::Exited(code));
            }
            tracing::warn!(pid = self.pid, grace_ms = grace.as_millis(), "grace period elapsed, sending SIGKILL");
        }

        self.start_kill();
        match self.wait_timeout(KILL_SETTLE_TIMEOUT).await {
            Some(code) => {
                tracing::info!(pid = self.pid, code, "process killed");
                Ok(TerminationOutcome::Killed(code))
            }
            None => Err(BurrowError::TerminationTimeout { pid: self.pid }),
        }
    }

    fn close_stdin(&self) {
        let mut stdin = match self.stdin.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        drop(stdin.take());
    }

    fn send_sigterm(&self) {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(self.pid) else {
            return;
        };
        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) => tracing::debug!(pid = self.pid, "sent SIGTERM"),
            Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => tracing::warn!(pid = self.pid, error = %e, "SIGTERM failed"),
        }
    }

    fn start_kill(&self) {
        let mut slot = match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.exit_code.is_none() {
            if let Err(e) = slot.child.start_kill() {
                tracing::warn!(pid = self.pid, error = %e, "SIGKILL failed");
            }
        }
    }
}
