//! CLI command definitions and dispatch.

pub mod console;
pub mod container;
pub mod distro;
pub mod env;
pub mod run;
pub mod venv;

use std::path::PathBuf;

use burrow_common::constants::BIN_NAME;
use burrow_sdk::Burrow;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;

use crate::interrupt::Interrupts;

/// Burrow: user-space containers on locked-down devices.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Data directory holding environments, containers, and venvs.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Path of the syscall-interception launcher binary.
    #[arg(long, global = true)]
    pub launcher: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Log output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read commands from stdin, one per line, until `exit` or EOF.
    Console,
    /// Start a container and keep it running until Ctrl+C or until it exits.
    Run(run::RunArgs),
    #[command(flatten)]
    Operation(Operation),
}

/// Commands available both from the shell and inside the console.
#[derive(Subcommand, Debug)]
pub enum Operation {
    /// Inspect the distribution catalog.
    #[command(subcommand)]
    Distro(distro::DistroCommand),
    /// Stage, inspect, and destroy root-filesystem environments.
    #[command(subcommand)]
    Env(env::EnvCommand),
    /// Manage containers.
    #[command(subcommand)]
    Container(container::ContainerCommand),
    /// Manage interpreter environments.
    #[command(subcommand)]
    Venv(venv::VenvCommand),
}

/// How long the engine outlives the command being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Session {
    /// A single shell invocation; containers stop when it returns.
    OneShot,
    /// The interactive console, which keeps the engine open between commands.
    Console,
}

/// Outcome of a command: its status line and whether it succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// One-line summary printed after any command output.
    pub line: String,
    /// Whether the command achieved what it was asked to.
    pub ok: bool,
}

impl Status {
    /// A successful outcome.
    pub fn ok(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            ok: true,
        }
    }

    /// A completed command that did not succeed, such as a non-zero exit.
    pub fn failed(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            ok: false,
        }
    }
}

/// Dispatches the parsed CLI command to its handler.
pub async fn execute(burrow: &Burrow, interrupts: &Interrupts, command: Command) -> bool {
    match command {
        Command::Console => console::execute(burrow, interrupts).await,
        Command::Run(args) => report(run::execute(burrow, interrupts, args).await),
        Command::Operation(operation) => {
            perform(burrow, interrupts, operation, Session::OneShot).await
        }
    }
}

/// Runs one operation under a fresh interrupt token and prints its status.
pub async fn perform(
    burrow: &Burrow,
    interrupts: &Interrupts,
    operation: Operation,
    session: Session,
) -> bool {
    let cancel = interrupts.token();
    let result = dispatch(burrow, operation, session, &cancel).await;
    cancel.cancel();
    report(result)
}

async fn dispatch(
    burrow: &Burrow,
    operation: Operation,
    session: Session,
    cancel: &CancellationToken,
) -> anyhow::Result<Status> {
    match operation {
        Operation::Distro(cmd) => distro::execute(burrow, cmd),
        Operation::Env(cmd) => env::execute(burrow, cmd, cancel).await,
        Operation::Container(cmd) => container::execute(burrow, cmd, session, cancel).await,
        Operation::Venv(cmd) => venv::execute(burrow, cmd, cancel).await,
    }
}

fn report(result: anyhow::Result<Status>) -> bool {
    match result {
        Ok(status) => {
            println!("{}", status.line);
            status.ok
        }
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            println!("error: {e:#}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_container_exec_with_trailing_command() {
        let cli = Cli::try_parse_from(["burrow", "container", "exec", "c1", "ls", "-la", "/"])
            .expect("parse");
        match cli.command {
            Command::Operation(Operation::Container(container::ContainerCommand::Exec {
                name,
                command,
            })) => {
                assert_eq!(name, "c1");
                assert_eq!(command, ["ls", "-la", "/"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_apply_after_subcommand() {
        let cli = Cli::try_parse_from([
            "burrow",
            "venv",
            "ls",
            "--data-dir",
            "/tmp/b",
            "--log-format",
            "json",
        ])
        .expect("parse");
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/b")));
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn venv_create_version_is_optional() {
        let cli = Cli::try_parse_from(["burrow", "venv", "create", "web"]).expect("parse");
        assert!(matches!(
            cli.command,
            Command::Operation(Operation::Venv(venv::VenvCommand::Create { version: None, .. }))
        ));
    }
}
