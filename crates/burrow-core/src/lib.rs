//! # burrow-core
//!
//! Process primitives for the Burrow runtime.
//!
//! This crate provides:
//! - **Command specs**: a declarative description of a process to start.
//! - **Process handles**: liveness, exit codes, and graceful/forced termination.
//! - **Supervisor**: owns every spawned child and runs the reaper loop that
//!   reports deaths to registered callbacks.
//! - **Launcher**: builds the argv for the user-space syscall-interception
//!   launcher (proot-style) that roots a process in a staged tree.
//!
//! The launcher emulates `chroot` and bind mounts by intercepting syscalls.
//! It is a filesystem view, not a security boundary.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod handle;
pub mod launcher;
pub mod spec;
pub mod supervisor;

pub use handle::{HandleId, ProcessHandle, TerminationOutcome};
pub use spec::{CommandSpec, ExecOutput, OutputTarget, StdinMode};
pub use supervisor::{ExitCallback, ExitNotice, MIN_REAPER_INTERVAL, Supervisor};
