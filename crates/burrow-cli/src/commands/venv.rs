//! `burrow venv`: interpreter environments.

use burrow_sdk::Burrow;
use clap::Subcommand;
use tokio_util::sync::CancellationToken;

use super::Status;
use crate::output::{format_time, render_table};

/// Interpreter-environment subcommands.
#[derive(Subcommand, Debug)]
pub enum VenvCommand {
    /// Bootstrap a new interpreter environment.
    Create {
        /// Environment name.
        name: String,
        /// Interpreter version, e.g. `3.12`. Defaults to the configured one.
        version: Option<String>,
    },
    /// Mark an environment as the active one.
    Activate {
        /// Environment name.
        name: String,
    },
    /// Install a package into an environment.
    Install {
        /// Environment name.
        name: String,
        /// Package requirement, e.g. `requests` or `flask==3.0`.
        package: String,
    },
    /// List interpreter environments.
    Ls,
    /// Delete an interpreter environment.
    Rm {
        /// Environment name.
        name: String,
    },
}

/// Executes a `venv` subcommand.
pub async fn execute(
    burrow: &Burrow,
    command: VenvCommand,
    cancel: &CancellationToken,
) -> anyhow::Result<Status> {
    let venvs = burrow.venvs();
    match command {
        VenvCommand::Create { name, version } => {
            let env = venvs
                .create_environment(&name, version.as_deref(), cancel)
                .await?;
            Ok(Status::ok(format!(
                "venv {} created with Python {} at {}",
                env.name,
                env.runtime_version,
                env.root_path.display()
            )))
        }
        VenvCommand::Activate { name } => {
            let env = venvs.activate_environment(&name)?;
            Ok(Status::ok(format!(
                "venv {} is active; run `export VIRTUAL_ENV={}` to use it in a shell",
                env.name,
                env.root_path.display()
            )))
        }
        VenvCommand::Install { name, package } => {
            let env = venvs.install_package(&name, &package, cancel).await?;
            Ok(Status::ok(format!(
                "installed {package} into {} ({} package(s))",
                env.name,
                env.packages.len()
            )))
        }
        VenvCommand::Ls => {
            let environments = venvs.list_environments();
            let rows: Vec<Vec<String>> = environments
                .iter()
                .map(|e| {
                    vec![
                        if e.active { "*" } else { "" }.to_string(),
                        e.name.clone(),
                        e.runtime_version.clone(),
                        e.packages.join(","),
                        format_time(&e.created_at),
                    ]
                })
                .collect();
            if !rows.is_empty() {
                println!(
                    "{}",
                    render_table(&["", "NAME", "PYTHON", "PACKAGES", "CREATED"], &rows)
                );
            }
            Ok(Status::ok(format!("{} venv(s)", rows.len())))
        }
        VenvCommand::Rm { name } => {
            venvs.remove_environment(&name).await?;
            Ok(Status::ok(format!("venv {name} removed")))
        }
    }
}
