//! Container record and state transitions.

use std::path::PathBuf;

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{ContainerConfiguration, ContainerId, ContainerState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A container: a named process slot bound to one staged environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    /// Unique identifier.
    pub id: ContainerId,
    /// Human-readable name, unique among existing containers.
    pub name: String,
    /// Name of the environment the container runs in.
    pub environment: String,
    /// Advisory configuration.
    pub config: ContainerConfiguration,
    /// Current lifecycle state.
    pub state: ContainerState,
    /// When the container was created.
    pub created_at: DateTime<Utc>,
    /// When the container last entered `Running`.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the container last left `Running`.
    #[serde(default)]
    pub stopped_at: Option<DateTime<Utc>>,
    /// Private directory holding `app`, `data`, `logs`, and `tmp`.
    pub root_path: PathBuf,
    /// Exit code of the last main process.
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Reason for the last failure.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Container {
    /// Creates a new container in the `Created` state.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        environment: impl Into<String>,
        config: ContainerConfiguration,
        root_path: PathBuf,
    ) -> Self {
        Self {
            id: ContainerId::generate(),
            name: name.into(),
            environment: environment.into(),
            config,
            state: ContainerState::Created,
            created_at: Utc::now(),
            started_at: None,
            stopped_at: None,
            root_path,
            exit_code: None,
            last_error: None,
        }
    }

    /// Moves the container to `to`, stamping the matching timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::InvalidState`] if the state machine forbids
    /// the move.
    pub fn transition(&mut self, to: ContainerState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(BurrowError::InvalidState {
                id: self.name.clone(),
                state: self.state.to_string(),
                operation: match to {
                    ContainerState::Running => "start",
                    ContainerState::Stopped => "stop",
                    ContainerState::Exited => "mark exited",
                    ContainerState::Error => "mark failed",
                    ContainerState::Created => "recreate",
                },
            });
        }
        let now = Utc::now();
        match to {
            ContainerState::Running => {
                self.started_at = Some(now);
                self.exit_code = None;
                self.last_error = None;
            }
            ContainerState::Stopped | ContainerState::Exited | ContainerState::Error => {
                if self.state == ContainerState::Running {
                    self.stopped_at = Some(now);
                }
            }
            ContainerState::Created => {}
        }
        tracing::debug!(id = %self.id, name = %self.name, from = %self.state, to = %to, "container transition");
        self.state = to;
        Ok(())
    }
}
