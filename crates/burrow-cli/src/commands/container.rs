//! `burrow container`: container lifecycle.

use std::io::Write;

use anyhow::Context;
use burrow_core::ExecOutput;
use burrow_runtime::Container;
use burrow_sdk::{Burrow, ContainerBuilder};
use clap::Subcommand;
use tokio_util::sync::CancellationToken;

use super::{Session, Status};
use crate::output::{format_bytes, format_time, or_dash, render_table};

/// Container subcommands.
#[derive(Subcommand, Debug)]
pub enum ContainerCommand {
    /// Create a container, staging its distribution on first use.
    Create {
        /// Container name.
        name: String,
        /// Distribution whose environment roots the container.
        distribution: String,
        /// Environment variable for the main process, as KEY=VALUE.
        #[arg(short, long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,
        /// Host path bound into the container, as HOST:GUEST.
        #[arg(short, long = "volume", value_name = "HOST:GUEST")]
        volume: Vec<String>,
        /// Working directory inside the container.
        #[arg(short, long)]
        workdir: Option<String>,
        /// Declared memory ceiling in bytes (not enforced).
        #[arg(long)]
        memory: Option<u64>,
        /// Declared CPU quota as a fraction of one CPU (not enforced).
        #[arg(long)]
        cpus: Option<f64>,
        /// Declared listening port (not forwarded).
        #[arg(short, long = "port")]
        port: Vec<u16>,
        /// Main process argv, after `--`. Defaults to the guest shell.
        #[arg(last = true)]
        entrypoint: Vec<String>,
    },
    /// Start a container's main process. Console only; from the shell use
    /// `burrow run`.
    Start {
        /// Container name.
        name: String,
    },
    /// Stop a container, escalating to SIGKILL after the grace period.
    Stop {
        /// Container name.
        name: String,
    },
    /// Run a shell command inside a running container. Console only.
    Exec {
        /// Container name.
        name: String,
        /// Command line passed to `/bin/sh -c`.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// List containers.
    Ls {
        /// Print JSON records instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Remove a container that is not running.
    Rm {
        /// Container name.
        name: String,
    },
    /// Print a container's console log.
    Logs {
        /// Container name.
        name: String,
    },
    /// Show resource usage of a container's main process.
    Stats {
        /// Container name.
        name: String,
    },
}

/// Executes a `container` subcommand.
pub async fn execute(
    burrow: &Burrow,
    command: ContainerCommand,
    session: Session,
    cancel: &CancellationToken,
) -> anyhow::Result<Status> {
    let engine = burrow.engine();
    match command {
        ContainerCommand::Create {
            name,
            distribution,
            env,
            volume,
            workdir,
            memory,
            cpus,
            port,
            entrypoint,
        } => {
            let mut builder = ContainerBuilder::new(&name)
                .distribution(&distribution)
                .entrypoint(entrypoint);
            for pair in &env {
                let (key, value) = pair
                    .split_once('=')
                    .with_context(|| format!("environment variable {pair:?} must be KEY=VALUE"))?;
                builder = builder.env(key, value);
            }
            for bind in &volume {
                let (host, guest) = bind
                    .split_once(':')
                    .with_context(|| format!("volume {bind:?} must be HOST:GUEST"))?;
                builder = builder.volume(host, guest);
            }
            if let Some(dir) = workdir {
                builder = builder.working_dir(dir);
            }
            if let Some(bytes) = memory {
                builder = builder.memory_limit(bytes);
            }
            if let Some(quota) = cpus {
                builder = builder.cpu_quota(quota);
            }
            for p in port {
                builder = builder.port(p);
            }
            let container = builder.create(engine, cancel).await?;
            Ok(Status::ok(format!(
                "container {} created on {} ({})",
                container.name, container.environment, container.id
            )))
        }
        ContainerCommand::Start { name } => {
            let id = engine.find_by_name(&name)?.id;
            if session == Session::OneShot {
                anyhow::bail!(
                    "container {name} would stop as soon as this command exits; \
                     use `burrow run {name}` or start it from `burrow console`"
                );
            }
            let container = engine.start_container(&id).await?;
            Ok(Status::ok(format!("container {} is {}", container.name, container.state)))
        }
        ContainerCommand::Stop { name } => {
            let id = engine.find_by_name(&name)?.id;
            let container = engine.stop_container(&id).await?;
            Ok(Status::ok(format!(
                "container {} is {} (exit code {})",
                container.name,
                container.state,
                or_dash(container.exit_code)
            )))
        }
        ContainerCommand::Exec { name, command } => {
            let id = engine.find_by_name(&name)?.id;
            if session == Session::OneShot {
                anyhow::bail!(
                    "container {name} only runs while `burrow run {name}` or \
                     `burrow console` holds it; exec into it from the console"
                );
            }
            let output = engine
                .execute_in_container(&id, &command.join(" "), cancel)
                .await?;
            Ok(exec_status(&output))
        }
        ContainerCommand::Ls { json } => {
            let containers = engine.list_containers();
            if json {
                println!("{}", serde_json::to_string_pretty(&containers)?);
            } else if !containers.is_empty() {
                println!("{}", container_table(&containers));
            }
            Ok(Status::ok(format!("{} container(s)", containers.len())))
        }
        ContainerCommand::Rm { name } => {
            let id = engine.find_by_name(&name)?.id;
            engine.remove_container(&id).await?;
            Ok(Status::ok(format!("container {name} removed")))
        }
        ContainerCommand::Logs { name } => {
            let container = engine.find_by_name(&name)?;
            let logs = engine.logs(&container.id)?;
            print!("{logs}");
            Ok(Status::ok(format!(
                "{} of console output from {name}",
                format_bytes(u64::try_from(logs.len()).unwrap_or(u64::MAX))
            )))
        }
        ContainerCommand::Stats { name } => {
            let container = engine.find_by_name(&name)?;
            let metrics = engine.metrics(&container.id).await?;
            let row = vec![
                or_dash(metrics.pid),
                or_dash(metrics.cpu_time_ms.map(|ms| format!("{ms} ms"))),
                or_dash(metrics.rss_bytes.map(format_bytes)),
                or_dash(metrics.virtual_bytes.map(format_bytes)),
                or_dash(metrics.threads),
                or_dash(metrics.uptime_ms.map(|ms| format!("{}s", ms / 1000))),
            ];
            println!(
                "{}",
                render_table(&["PID", "CPU", "RSS", "VIRTUAL", "THREADS", "UPTIME"], &[row])
            );
            Ok(Status::ok(format!("container {name} is {}", container.state)))
        }
    }
}

fn container_table(containers: &[Container]) -> String {
    let rows: Vec<Vec<String>> = containers
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                c.state.to_string(),
                c.environment.clone(),
                format_time(&c.created_at),
                or_dash(c.exit_code),
                c.id.to_string(),
            ]
        })
        .collect();
    render_table(
        &["NAME", "STATE", "ENVIRONMENT", "CREATED", "EXIT", "ID"],
        &rows,
    )
}

/// Echoes a one-shot command's output and summarises its exit code.
pub fn exec_status(output: &ExecOutput) -> Status {
    print!("{}", output.stdout);
    let _ = std::io::stdout().flush();
    eprint!("{}", output.stderr);
    let line = format!("exit code {}", output.exit_code);
    if output.success() {
        Status::ok(line)
    } else {
        Status::failed(line)
    }
}
