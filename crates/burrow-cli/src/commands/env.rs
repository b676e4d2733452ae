//! `burrow env`: root-filesystem environments.

use burrow_sdk::Burrow;
use clap::Subcommand;
use tokio_util::sync::CancellationToken;

use super::Status;
use crate::output::{format_time, or_dash, render_table};

/// Environment subcommands.
#[derive(Subcommand, Debug)]
pub enum EnvCommand {
    /// Stage a distribution into a new environment.
    Create {
        /// Catalog distribution to stage.
        distribution: String,
        /// Environment name; defaults to the distribution name.
        name: Option<String>,
    },
    /// List staged environments.
    Ls,
    /// Delete an environment and its root tree.
    Destroy {
        /// Environment name.
        name: String,
    },
    /// Run a shell command inside an environment.
    Exec {
        /// Environment name.
        name: String,
        /// Command line passed to `/bin/sh -c`.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

/// Executes an `env` subcommand.
pub async fn execute(
    burrow: &Burrow,
    command: EnvCommand,
    cancel: &CancellationToken,
) -> anyhow::Result<Status> {
    let rootfs = burrow.engine().rootfs();
    match command {
        EnvCommand::Create { distribution, name } => {
            let name = name.unwrap_or_else(|| distribution.clone());
            let env = rootfs
                .create_environment(&distribution, &name, cancel)
                .await?;
            Ok(Status::ok(format!(
                "environment {} ready at {}",
                env.name,
                env.root_path.display()
            )))
        }
        EnvCommand::Ls => {
            let environments = rootfs.list_environments();
            let rows: Vec<Vec<String>> = environments
                .iter()
                .map(|e| {
                    vec![
                        e.name.clone(),
                        e.distribution.clone(),
                        e.status.to_string(),
                        format_time(&e.created_at),
                        or_dash(e.last_error.as_deref()),
                    ]
                })
                .collect();
            if !rows.is_empty() {
                println!(
                    "{}",
                    render_table(&["NAME", "DISTRIBUTION", "STATUS", "CREATED", "ERROR"], &rows)
                );
            }
            Ok(Status::ok(format!("{} environment(s)", rows.len())))
        }
        EnvCommand::Destroy { name } => {
            burrow.engine().destroy_environment(&name).await?;
            Ok(Status::ok(format!("environment {name} destroyed")))
        }
        EnvCommand::Exec { name, command } => {
            let output = rootfs
                .execute_in_environment(&name, &command.join(" "), cancel)
                .await?;
            Ok(super::container::exec_status(&output))
        }
    }
}
