//! Lifecycle event stream and audit sink.
//!
//! Every state change is broadcast to subscribers and appended as one JSON
//! line to `<data>/logs/lifecycle.jsonl`.

use std::path::{Path, PathBuf};

use burrow_common::constants::{LIFECYCLE_LOG_FILE, LOGS_DIR};
use burrow_common::types::{ContainerId, ContainerState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::container::Container;
use crate::logs::append_line;

const EVENT_CAPACITY: usize = 256;

/// A container state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Container that changed.
    pub container_id: ContainerId,
    /// Its name at the time of the change.
    pub container_name: String,
    /// Previous state; `None` when the container was just created.
    pub old_state: Option<ContainerState>,
    /// New state.
    pub new_state: ContainerState,
    /// When the change happened.
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    /// Event describing `container` having just left `old_state`.
    #[must_use]
    pub fn for_container(container: &Container, old_state: Option<ContainerState>) -> Self {
        Self {
            container_id: container.id.clone(),
            container_name: container.name.clone(),
            old_state,
            new_state: container.state,
            timestamp: Utc::now(),
        }
    }
}

/// Fan-out of lifecycle events to subscribers and the audit log.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
    audit_path: PathBuf,
}

impl EventBus {
    /// Creates a bus writing its audit log under `data_dir`.
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sender,
            audit_path: data_dir.join(LOGS_DIR).join(LIFECYCLE_LOG_FILE),
        }
    }

    /// Path of the audit log.
    #[must_use]
    pub fn audit_path(&self) -> &Path {
        &self.audit_path
    }

    /// New receiver seeing every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. A failing audit write is logged, not returned:
    /// the transition it records has already happened.
    pub fn publish(&self, event: LifecycleEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => {
                if let Err(e) = append_line(&self.audit_path, &line) {
                    tracing::error!(error = %e, "failed to append lifecycle audit line");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize lifecycle event"),
        }
        tracing::info!(
            id = %event.container_id,
            name = %event.container_name,
            from = ?event.old_state,
            to = %event.new_state,
            "lifecycle event"
        );
        // No receivers is fine.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use burrow_common::types::ContainerConfiguration;

    use super::*;

    #[tokio::test]
    async fn published_events_reach_subscribers_and_audit_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bus = EventBus::new(dir.path());
        let mut rx = bus.subscribe();
        let container = Container::new(
            "web",
            "env1",
            ContainerConfiguration::default(),
            PathBuf::from("/c/web"),
        );

        bus.publish(LifecycleEvent::for_container(&container, None));

        let event = rx.recv().await.expect("event");
        assert_eq!(event.container_name, "web");
        assert_eq!(event.old_state, None);
        assert_eq!(event.new_state, ContainerState::Created);

        let audit = std::fs::read_to_string(bus.audit_path()).expect("audit");
        let line: LifecycleEvent = serde_json::from_str(audit.trim()).expect("json line");
        assert_eq!(line, event);
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bus = EventBus::new(dir.path());
        let container = Container::new(
            "web",
            "env1",
            ContainerConfiguration::default(),
            PathBuf::from("/c/web"),
        );
        bus.publish(LifecycleEvent::for_container(&container, None));
        assert!(bus.audit_path().is_file());
    }
}
