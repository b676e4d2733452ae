//! `burrow console`: line-oriented command console.
//!
//! Each line is split on whitespace and parsed with the same grammar as the
//! shell commands, so `container start web` typed here behaves exactly like
//! `burrow container start web`.

use std::io::IsTerminal;

use burrow_common::constants::BIN_NAME;
use burrow_sdk::Burrow;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{Operation, Session, perform};
use crate::interrupt::Interrupts;

const PROMPT: &str = "burrow> ";

#[derive(Parser, Debug)]
#[command(name = BIN_NAME, no_binary_name = true, disable_version_flag = true)]
struct ConsoleLine {
    #[command(subcommand)]
    operation: Operation,
}

/// What a console line asks for.
#[derive(Debug)]
enum Input {
    Blank,
    Quit,
    Run(Operation),
    Invalid(clap::Error),
}

fn parse_line(line: &str) -> Input {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.first().copied() {
        None => Input::Blank,
        Some(word) if word.starts_with('#') => Input::Blank,
        Some("exit" | "quit") => Input::Quit,
        Some(_) => match ConsoleLine::try_parse_from(words) {
            Ok(parsed) => Input::Run(parsed.operation),
            Err(e) => Input::Invalid(e),
        },
    }
}

/// Runs the console until `exit`, `quit`, or end of input.
///
/// Returns `false` only if stdin could not be read; failed commands are
/// reported on their status line and the console carries on.
pub async fn execute(burrow: &Burrow, interrupts: &Interrupts) -> bool {
    let interactive = std::io::stdin().is_terminal();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if interactive {
            eprint!("{PROMPT}");
        }
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return true,
            Err(e) => {
                println!("error: cannot read console input: {e}");
                return false;
            }
        };
        match parse_line(&line) {
            Input::Blank => {}
            Input::Quit => return true,
            Input::Run(operation) => {
                let _ = perform(burrow, interrupts, operation, Session::Console).await;
            }
            Input::Invalid(e) => {
                let _ = e.print();
            }
        }
    }
}
