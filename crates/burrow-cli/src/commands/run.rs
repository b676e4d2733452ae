//! `burrow run`: start a container and stay attached until Ctrl+C.

use burrow_common::types::ContainerState;
use burrow_sdk::{Burrow, EventListener};
use clap::Args;

use super::Status;
use crate::interrupt::Interrupts;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Container name.
    pub name: String,
}

/// Executes the `run` command.
///
/// The container is stopped on Ctrl+C. If its main process exits on its
/// own first, the final state is reported instead.
pub async fn execute(
    burrow: &Burrow,
    interrupts: &Interrupts,
    args: RunArgs,
) -> anyhow::Result<Status> {
    let engine = burrow.engine();
    let id = engine.find_by_name(&args.name)?.id;
    let mut events = EventListener::new(engine).for_container(id.clone());
    let started = engine.start_container(&id).await?;
    eprintln!(
        "container {} is {}; press Ctrl+C to stop it",
        started.name, started.state
    );

    let exited = async {
        while let Some(event) = events.next().await {
            if event.new_state != ContainerState::Running {
                return Some(event.new_state);
            }
        }
        None
    };
    tokio::select! {
        () = interrupts.wait() => {
            tracing::info!(name = %args.name, "stopping on interrupt");
            let stopped = engine.stop_container(&id).await?;
            Ok(Status::ok(format!("container {} is {}", stopped.name, stopped.state)))
        }
        state = exited => {
            let container = engine.container(&id)?;
            let line = format!(
                "container {} is {} (exit code {})",
                container.name,
                state.unwrap_or(container.state),
                crate::output::or_dash(container.exit_code)
            );
            if container.exit_code == Some(0) {
                Ok(Status::ok(line))
            } else {
                Ok(Status::failed(line))
            }
        }
    }
}
