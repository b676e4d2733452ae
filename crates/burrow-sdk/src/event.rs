//! Container lifecycle event streaming.
//!
//! Wraps the engine's broadcast channel so that SDK consumers see a plain
//! async stream of [`LifecycleEvent`]s, optionally narrowed to one
//! container.

use std::time::Duration;

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{ContainerId, ContainerState};
use burrow_runtime::{Engine, LifecycleEvent};
use tokio::sync::broadcast::{self, error::RecvError};

/// Listens for container lifecycle events.
#[derive(Debug)]
pub struct EventListener {
    receiver: broadcast::Receiver<LifecycleEvent>,
    container: Option<ContainerId>,
}

impl EventListener {
    /// Listens to every container managed by `engine`, from now on.
    #[must_use]
    pub fn new(engine: &Engine) -> Self {
        Self::from_receiver(engine.subscribe())
    }

    /// Wraps an existing receiver.
    #[must_use]
    pub const fn from_receiver(receiver: broadcast::Receiver<LifecycleEvent>) -> Self {
        Self {
            receiver,
            container: None,
        }
    }

    /// Narrows the listener to a single container.
    #[must_use]
    pub fn for_container(mut self, id: ContainerId) -> Self {
        self.container = Some(id);
        self
    }

    /// Next matching event, or `None` once the engine is gone.
    ///
    /// A listener that falls behind skips the events it missed.
    pub async fn next(&mut self) -> Option<LifecycleEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event listener lagged; events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Waits until a matching event reports `state`.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::TimedOut`] if `timeout` elapses first and
    /// [`BurrowError::Cancelled`] if the engine goes away.
    pub async fn wait_for(
        &mut self,
        state: ContainerState,
        timeout: Duration,
    ) -> Result<LifecycleEvent> {
        let wait = async {
            while let Some(event) = self.next().await {
                if event.new_state == state {
                    return Some(event);
                }
            }
            None
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(BurrowError::Cancelled {
                operation: format!("waiting for state {state}"),
            }),
            Err(_) => Err(BurrowError::TimedOut {
                operation: format!("waiting for state {state}"),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    fn matches(&self, event: &LifecycleEvent) -> bool {
        self.container
            .as_ref()
            .is_none_or(|id| *id == event.container_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn event(id: &str, old: Option<ContainerState>, new: ContainerState) -> LifecycleEvent {
        LifecycleEvent {
            container_id: ContainerId::new(id),
            container_name: id.to_string(),
            old_state: old,
            new_state: new,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn filters_by_container() {
        let (tx, rx) = broadcast::channel(8);
        let mut listener = EventListener::from_receiver(rx).for_container(ContainerId::new("b"));
        let _ = tx.send(event("a", None, ContainerState::Created)).expect("send");
        let _ = tx.send(event("b", None, ContainerState::Created)).expect("send");
        let got = listener.next().await.expect("event");
        assert_eq!(got.container_id, ContainerId::new("b"));
    }

    #[tokio::test]
    async fn closed_channel_ends_stream() {
        let (tx, rx) = broadcast::channel::<LifecycleEvent>(8);
        let mut listener = EventListener::from_receiver(rx);
        drop(tx);
        assert!(listener.next().await.is_none());
    }

    #[tokio::test]
    async fn lagging_listener_skips_ahead() {
        let (tx, rx) = broadcast::channel(2);
        let mut listener = EventListener::from_receiver(rx);
        for _ in 0..3 {
            let _ = tx.send(event("a", None, ContainerState::Created)).expect("send");
        }
        let _ = tx
            .send(event("a", Some(ContainerState::Created), ContainerState::Running))
            .expect("send");
        let got = listener
            .wait_for(ContainerState::Running, Duration::from_secs(1))
            .await
            .expect("running");
        assert_eq!(got.old_state, Some(ContainerState::Created));
    }

    #[tokio::test]
    async fn wait_for_times_out() {
        let (_tx, rx) = broadcast::channel::<LifecycleEvent>(8);
        let mut listener = EventListener::from_receiver(rx);
        let err = listener
            .wait_for(ContainerState::Exited, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, BurrowError::TimedOut { timeout_ms: 20, .. }), "{err}");
    }

    #[tokio::test]
    async fn wait_for_reports_a_closed_stream_as_cancelled() {
        let (tx, rx) = broadcast::channel::<LifecycleEvent>(8);
        let mut listener = EventListener::from_receiver(rx);
        drop(tx);
        let err = listener
            .wait_for(ContainerState::Exited, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, BurrowError::Cancelled { .. }), "{err}");
    }
}
