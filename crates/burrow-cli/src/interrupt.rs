//! Ctrl+C handling.
//!
//! The process-wide handler bumps a counter; each command gets a fresh
//! cancellation token tied to the next bump, so an interrupt cancels the
//! command in flight without ending the console.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Source of per-command cancellation tokens.
#[derive(Debug, Clone)]
pub struct Interrupts {
    receiver: watch::Receiver<u64>,
}

impl Interrupts {
    /// Installs the Ctrl+C handler. Only one may exist per process.
    pub fn install() -> anyhow::Result<Self> {
        let (sender, receiver) = watch::channel(0_u64);
        ctrlc::set_handler(move || {
            sender.send_modify(|count| *count += 1);
        })
        .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;
        Ok(Self { receiver })
    }

    /// Token cancelled by the next interrupt. Cancel it once the command
    /// is done to release the watcher task.
    pub fn token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut receiver = self.receiver.clone();
        let _ = receiver.borrow_and_update();
        let watched = token.clone();
        drop(tokio::spawn(async move {
            tokio::select! {
                changed = receiver.changed() => {
                    if changed.is_ok() {
                        tracing::info!("interrupted");
                        watched.cancel();
                    }
                }
                () = watched.cancelled() => {}
            }
        }));
        token
    }

    /// Waits for the next interrupt.
    pub async fn wait(&self) {
        let mut receiver = self.receiver.clone();
        let _ = receiver.borrow_and_update();
        if receiver.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
