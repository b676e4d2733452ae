//! Unified error types for the Burrow workspace.
//!
//! Every failure carries a specific reason. [`BurrowError::kind`] maps each
//! variant onto the coarse taxonomy callers branch on.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a [`BurrowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad or duplicate name, unknown entity, or unready dependency.
    Configuration,
    /// Root-tree extraction or copy failed.
    Staging,
    /// Spawn failure, unexpected exit, termination timeout, cancellation.
    Process,
    /// Operation invalid for the current state of an entity.
    State,
    /// Filesystem or serialization plumbing failed.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Staging => write!(f, "staging"),
            Self::Process => write!(f, "process"),
            Self::State => write!(f, "state"),
            Self::Io => write!(f, "io"),
        }
    }
}

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BurrowError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A name is already taken.
    #[error("{kind} name already in use: {name}")]
    DuplicateName {
        /// Type of the entity owning the name.
        kind: &'static str,
        /// The conflicting name.
        name: String,
    },

    /// A name is not usable as an on-disk identifier.
    #[error("invalid {kind} name {name:?}: {reason}")]
    InvalidName {
        /// Type of the entity being named.
        kind: &'static str,
        /// The rejected name.
        name: String,
        /// Why the name was rejected.
        reason: &'static str,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A dependency is not ready for use.
    #[error("environment {environment} is not ready (status: {status})")]
    NotReady {
        /// Environment that was expected to be ready.
        environment: String,
        /// Status the environment is actually in.
        status: String,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Staging a root tree failed. Nothing was left on disk.
    #[error("staging environment {name} failed: {reason}")]
    Staging {
        /// Environment being staged.
        name: String,
        /// Why staging failed.
        reason: String,
    },

    /// A content hash did not match its declaration.
    #[error("hash mismatch for {resource}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Resource that failed validation.
        resource: String,
        /// Expected hash value.
        expected: String,
        /// Actual computed hash value.
        actual: String,
    },

    /// The launcher could not be started for an environment.
    #[error("cannot launch into {environment}: {reason}")]
    Launch {
        /// Environment the launch targeted.
        environment: String,
        /// Why the launch failed.
        reason: String,
    },

    /// The operating system refused to spawn a process.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to spawn.
        program: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A process survived forced termination.
    #[error("process {pid} did not exit after forced termination")]
    TerminationTimeout {
        /// PID of the stuck process.
        pid: u32,
    },

    /// An operation was cancelled before it settled.
    #[error("{operation} was cancelled")]
    Cancelled {
        /// The cancelled operation.
        operation: String,
    },

    /// An operation did not settle within its deadline.
    #[error("{operation} timed out after {timeout_ms} ms")]
    TimedOut {
        /// The operation that ran out of time.
        operation: String,
        /// Deadline that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// A container is not running.
    #[error("container {container} is not running (state: {state})")]
    NotRunning {
        /// Container that was expected to run.
        container: String,
        /// State the container is actually in.
        state: String,
    },

    /// An environment is bound to a running container.
    #[error("environment {environment} is in use by {holder}")]
    InUse {
        /// Environment that cannot be destroyed.
        environment: String,
        /// Entity currently holding it.
        holder: String,
    },

    /// An operation is not valid for the entity's current state.
    #[error("cannot {operation} {id} in state {state}")]
    InvalidState {
        /// Entity identifier.
        id: String,
        /// Current state.
        state: String,
        /// Attempted operation.
        operation: &'static str,
    },

    /// Creating an interpreter environment failed.
    #[error("creating interpreter environment {name} failed: {reason}\n{output}")]
    Creation {
        /// Environment name.
        name: String,
        /// Why creation failed.
        reason: String,
        /// Captured bootstrap output.
        output: String,
    },

    /// Installing a package into an interpreter environment failed.
    #[error("installing {package} into {name} failed (exit code {exit_code}):\n{output}")]
    Install {
        /// Environment name.
        name: String,
        /// Requested package specification.
        package: String,
        /// Exit code of the package manager.
        exit_code: i32,
        /// Captured package-manager output.
        output: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl BurrowError {
    /// Returns the taxonomy bucket this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateName { .. }
            | Self::InvalidName { .. }
            | Self::NotFound { .. }
            | Self::NotReady { .. }
            | Self::Config { .. } => ErrorKind::Configuration,
            Self::Staging { .. } | Self::HashMismatch { .. } => ErrorKind::Staging,
            Self::Launch { .. }
            | Self::Spawn { .. }
            | Self::TerminationTimeout { .. }
            | Self::Cancelled { .. }
            | Self::TimedOut { .. }
            | Self::Creation { .. }
            | Self::Install { .. } => ErrorKind::Process,
            Self::NotRunning { .. } | Self::InUse { .. } | Self::InvalidState { .. } => {
                ErrorKind::State
            }
            Self::Io { .. } | Self::Serialization { .. } => ErrorKind::Io,
        }
    }

    /// Wraps an I/O error with the path it occurred at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BurrowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_name_is_configuration_error() {
        let err = BurrowError::DuplicateName {
            kind: "container",
            name: "c1".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.to_string(), "container name already in use: c1");
    }

    #[test]
    fn timed_out_is_process_error() {
        let err = BurrowError::TimedOut {
            operation: "waiting for state exited".into(),
            timeout_ms: 20,
        };
        assert_eq!(err.kind(), ErrorKind::Process);
        assert_eq!(err.to_string(), "waiting for state exited timed out after 20 ms");
    }

    #[test]
    fn in_use_is_state_error() {
        let err = BurrowError::InUse {
            environment: "env1".into(),
            holder: "container c1".into(),
        };
        assert_eq!(err.kind(), ErrorKind::State);
        assert!(err.to_string().contains("env1"));
    }

    #[test]
    fn staging_reason_is_surfaced() {
        let err = BurrowError::Staging {
            name: "env1".into(),
            reason: "insufficient storage".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Staging);
        assert!(err.to_string().contains("insufficient storage"));
    }

    #[test]
    fn install_error_carries_output() {
        let err = BurrowError::Install {
            name: "py".into(),
            package: "requests".into(),
            exit_code: 1,
            output: "no network".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Process);
        assert!(err.to_string().contains("no network"));
    }
}
