//! `burrow distro`: the distribution catalog.

use burrow_common::types::Distribution;
use burrow_sdk::Burrow;
use clap::Subcommand;

use super::Status;
use crate::output::render_table;

/// Catalog subcommands.
#[derive(Subcommand, Debug)]
pub enum DistroCommand {
    /// List distributions that can be staged.
    Ls,
    /// Register a distribution archive.
    Add {
        /// Short name, used as the default environment name.
        name: String,
        /// Archive URI: `file://<dir>`, `tar://<archive>`, or `http(s)://...`.
        archive: String,
        /// Human-readable name; defaults to the short name.
        #[arg(long)]
        display_name: Option<String>,
        /// Package manager shipped in the tree.
        #[arg(long, default_value = "unknown")]
        package_manager: String,
        /// Expected SHA-256 of the archive.
        #[arg(long)]
        sha256: Option<String>,
    },
    /// Remove a registered distribution.
    Rm {
        /// Short name.
        name: String,
    },
}

/// Executes a `distro` subcommand.
pub fn execute(burrow: &Burrow, command: DistroCommand) -> anyhow::Result<Status> {
    let rootfs = burrow.engine().rootfs();
    match command {
        DistroCommand::Ls => {
            let distributions = rootfs.list_distributions()?;
            let rows: Vec<Vec<String>> = distributions
                .iter()
                .map(|d| {
                    vec![
                        d.name.clone(),
                        d.display_name.clone(),
                        d.package_manager.clone(),
                        rootfs.environment_status(&d.name).to_string(),
                        d.archive.clone(),
                    ]
                })
                .collect();
            if !rows.is_empty() {
                println!(
                    "{}",
                    render_table(&["NAME", "DISPLAY NAME", "PACKAGES", "STATUS", "ARCHIVE"], &rows)
                );
            }
            Ok(Status::ok(format!("{} distribution(s)", rows.len())))
        }
        DistroCommand::Add {
            name,
            archive,
            display_name,
            package_manager,
            sha256,
        } => {
            rootfs.register_distribution(Distribution {
                display_name: display_name.unwrap_or_else(|| name.clone()),
                name: name.clone(),
                package_manager,
                archive,
                sha256,
            })?;
            Ok(Status::ok(format!("distribution {name} registered")))
        }
        DistroCommand::Rm { name } => {
            rootfs.remove_distribution(&name)?;
            Ok(Status::ok(format!("distribution {name} removed")))
        }
    }
}
