//! Process supervisor and reaper loop.
//!
//! Every process started through the supervisor is tracked until it is
//! reaped. A background task polls tracked handles at a fixed interval and
//! reports each death to the registered exit callbacks exactly once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use burrow_common::error::{BurrowError, Result};
use tokio_util::sync::CancellationToken;

use crate::handle::{HandleId, ProcessHandle, TerminationOutcome};
use crate::spec::{CommandSpec, ExecOutput, OutputTarget, StdinMode, exit_code_of};

/// Shortest poll interval the reaper accepts.
pub const MIN_REAPER_INTERVAL: Duration = Duration::from_millis(1);

/// Report of a tracked process dying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitNotice {
    /// Handle of the dead process.
    pub handle_id: HandleId,
    /// OS process id it had.
    pub pid: u32,
    /// Exit code, `128 + signal` when killed by a signal.
    pub exit_code: i32,
    /// Whether termination had been requested through the handle.
    pub expected: bool,
}

/// Callback invoked from the reaper for every observed death.
pub type ExitCallback = Arc<dyn Fn(&ExitNotice) + Send + Sync>;

struct Inner {
    handles: Mutex<HashMap<HandleId, Arc<ProcessHandle>>>,
    callbacks: Mutex<Vec<ExitCallback>>,
    next_id: AtomicU64,
    interval: Duration,
    shutdown: CancellationToken,
}

/// Spawns, tracks, and reaps OS processes.
///
/// Cloning is cheap; clones share the same process table.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("interval", &self.inner.interval)
            .field("live", &self.live_count())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Creates a supervisor and starts its reaper on the current tokio
    /// runtime.
    ///
    /// Intervals below [`MIN_REAPER_INTERVAL`] are raised to it.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn start(interval: Duration) -> Self {
        if interval < MIN_REAPER_INTERVAL {
            tracing::warn!(requested = ?interval, "reaper interval too short, raising it");
        }
        let interval = interval.max(MIN_REAPER_INTERVAL);
        let inner = Arc::new(Inner {
            handles: Mutex::new(HashMap::new()),
            callbacks: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            interval,
            shutdown: CancellationToken::new(),
        });
        let _reaper = tokio::spawn(reaper_loop(Arc::downgrade(&inner), inner.shutdown.clone()));
        tracing::debug!(interval_ms = interval.as_millis(), "reaper started");
        Self { inner }
    }

    /// Reaper poll interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Registers a callback invoked for every reaped process.
    pub fn on_exit(&self, callback: ExitCallback) {
        lock(&self.inner.callbacks).push(callback);
    }

    /// Starts a long-lived process and tracks it until it is reaped.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Spawn`] if the OS refuses to start the program.
    pub fn spawn(&self, spec: &CommandSpec) -> Result<Arc<ProcessHandle>> {
        let mut cmd = spec.to_command()?;
        let child = cmd.spawn().map_err(|e| BurrowError::Spawn {
            program: spec.program.display().to_string(),
            source: e,
        })?;
        let id = HandleId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = Arc::new(ProcessHandle::new(id, child, spec.to_string())?);
        let _ = lock(&self.inner.handles).insert(id, Arc::clone(&handle));
        tracing::info!(handle = %id, pid = handle.pid(), command = %spec, "process spawned");
        Ok(handle)
    }

    /// Runs a one-shot command to completion and captures its output.
    ///
    /// Cancelling `cancel` kills the child; it is reaped in the background
    /// by the runtime, never orphaned.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Spawn`] if the program cannot be started,
    /// [`BurrowError::Cancelled`] if cancelled first. A non-zero exit code
    /// is not an error.
    pub async fn run(&self, spec: &CommandSpec, cancel: &CancellationToken) -> Result<ExecOutput> {
        let one_shot = CommandSpec {
            stdin: StdinMode::Null,
            output: OutputTarget::Null,
            ..spec.clone()
        };
        let mut cmd = one_shot.to_command()?;
        let _ = cmd
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        let child = cmd.spawn().map_err(|e| BurrowError::Spawn {
            program: spec.program.display().to_string(),
            source: e,
        })?;
        let pid = child.id();
        tracing::debug!(?pid, command = %spec, "running one-shot command");

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::warn!(?pid, command = %spec, "one-shot command cancelled, killing");
                Err(BurrowError::Cancelled { operation: spec.to_string() })
            }
            output = child.wait_with_output() => {
                let output = output.map_err(|e| BurrowError::Spawn {
                    program: spec.program.display().to_string(),
                    source: e,
                })?;
                let exit_code = exit_code_of(output.status);
                tracing::debug!(?pid, exit_code, "one-shot command finished");
                Ok(ExecOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code,
                })
            }
        }
    }

    /// Terminates a tracked process and stops tracking it.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::TerminationTimeout`] if the process survives
    /// SIGKILL. It stays tracked in that case.
    pub async fn terminate(
        &self,
        handle: &ProcessHandle,
        graceful: bool,
        grace: Duration,
    ) -> Result<TerminationOutcome> {
        let outcome = handle.terminate(graceful, grace).await?;
        let _ = lock(&self.inner.handles).remove(&handle.id());
        Ok(outcome)
    }

    /// Snapshot of every tracked handle.
    #[must_use]
    pub fn live_handles(&self) -> Vec<Arc<ProcessHandle>> {
        lock(&self.inner.handles).values().cloned().collect()
    }

    /// Number of tracked handles.
    #[must_use]
    pub fn live_count(&self) -> usize {
        lock(&self.inner.handles).len()
    }

    /// Runs one reaper pass and returns the deaths it observed.
    ///
    /// The background loop calls this every interval; it is public so
    /// callers can force a pass.
    pub fn reap_once(&self) -> Vec<ExitNotice> {
        reap(&self.inner)
    }

    /// Stops the reaper and terminates every tracked process.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner.shutdown.cancel();
        for handle in self.live_handles() {
            if let Err(e) = self.terminate(&handle, true, grace).await {
                tracing::error!(pid = handle.pid(), error = %e, "process survived shutdown");
            }
        }
        tracing::debug!("supervisor shut down");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn reap(inner: &Inner) -> Vec<ExitNotice> {
    let snapshot: Vec<Arc<ProcessHandle>> = lock(&inner.handles).values().cloned().collect();
    let mut notices = Vec::new();
    for handle in snapshot {
        if let Some(exit_code) = handle.poll_exit() {
            // Only the pass that removes the entry reports it.
            if lock(&inner.handles).remove(&handle.id()).is_some() {
                notices.push(ExitNotice {
                    handle_id: handle.id(),
                    pid: handle.pid(),
                    exit_code,
                    expected: handle.termination_requested(),
                });
            }
        }
    }
    if notices.is_empty() {
        return notices;
    }
    let callbacks: Vec<ExitCallback> = lock(&inner.callbacks).clone();
    for notice in &notices {
        if notice.expected {
            tracing::debug!(handle = %notice.handle_id, pid = notice.pid, code = notice.exit_code, "reaped terminated process");
        } else {
            tracing::warn!(handle = %notice.handle_id, pid = notice.pid, code = notice.exit_code, "process exited unexpectedly");
        }
        for callback in &callbacks {
            callback(notice);
        }
    }
    notices
}

async fn reaper_loop(inner: Weak<Inner>, shutdown: CancellationToken) {
    let interval = match inner.upgrade() {
        Some(inner) => inner.interval,
        None => return,
    };
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let _ = reap(&inner);
    }
    tracing::debug!("reaper stopped");
}
