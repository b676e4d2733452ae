//! # burrow
//!
//! User-space containers for locked-down devices, run through a
//! syscall-interception launcher. One binary for staging distributions,
//! managing containers, and bootstrapping interpreter environments.

#![allow(clippy::print_stdout, clippy::print_stderr)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

mod commands;
mod interrupt;
mod output;

use std::process::ExitCode;

use anyhow::Context;
use burrow_common::config::BurrowConfig;
use burrow_sdk::Burrow;
use clap::Parser;

use crate::commands::{Cli, LogFormat};
use crate::interrupt::Interrupts;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config =
        BurrowConfig::load(cli.data_dir.as_deref()).context("failed to load configuration")?;
    if let Some(launcher) = cli.launcher {
        config.launcher = launcher;
    }
    tracing::debug!(data_dir = %config.data_dir.display(), "starting");

    let interrupts = Interrupts::install()?;
    let burrow = Burrow::open(config).context("failed to open the data directory")?;
    let ok = commands::execute(&burrow, &interrupts, cli.command).await;
    burrow.shutdown().await;
    Ok(ok)
}
