//! Declarative process descriptions.

use std::fmt;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;

use burrow_common::error::{BurrowError, Result};

/// What the child's stdin is connected to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StdinMode {
    /// `/dev/null`.
    #[default]
    Null,
    /// A pipe held open by the process handle until termination.
    ///
    /// An interactive shell reading from it stays alive until the pipe
    /// closes.
    Piped,
}

/// Where a long-lived child's stdout and stderr go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputTarget {
    /// Discard output.
    #[default]
    Null,
    /// Append both streams to a log file.
    File(PathBuf),
}

/// A process to start.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: PathBuf,
    /// Arguments, without the program itself.
    pub args: Vec<String>,
    /// Working directory on the host.
    pub working_dir: Option<PathBuf>,
    /// Environment variables set on the child.
    pub env: Vec<(String, String)>,
    /// Start from an empty environment instead of inheriting ours.
    pub clear_env: bool,
    /// Stdin wiring.
    pub stdin: StdinMode,
    /// Output wiring for spawned (not one-shot) processes.
    pub output: OutputTarget,
}

impl CommandSpec {
    /// Creates a spec for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Appends arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Builds the tokio command with stdin and output wired as declared.
    ///
    /// Children are always killed when their handle is dropped so a
    /// cancelled caller cannot orphan them.
    ///
    /// # Errors
    ///
    /// Returns an error if the output log file cannot be opened.
    pub(crate) fn to_command(&self) -> Result<tokio::process::Command> {
        let mut cmd = tokio::process::Command::new(&self.program);
        let _ = cmd.args(&self.args).kill_on_drop(true);
        if self.clear_env {
            let _ = cmd.env_clear();
        }
        for (key, value) in &self.env {
            let _ = cmd.env(key, value);
        }
        if let Some(dir) = &self.working_dir {
            let _ = cmd.current_dir(dir);
        }
        let _ = cmd.stdin(match self.stdin {
            StdinMode::Null => Stdio::null(),
            StdinMode::Piped => Stdio::piped(),
        });
        match &self.output {
            OutputTarget::Null => {
                let _ = cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
            OutputTarget::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| BurrowError::io(parent, e))?;
                }
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| BurrowError::io(path, e))?;
                let err = file.try_clone().map_err(|e| BurrowError::io(path, e))?;
                let _ = cmd.stdout(file).stderr(err);
            }
        }
        Ok(cmd)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a one-shot command.
///
/// A non-zero `exit_code` is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output from the command.
    pub stdout: String,
    /// Standard error from the command.
    pub stderr: String,
    /// Exit code returned by the command; `128 + signal` if it was killed.
    pub exit_code: i32,
}

impl ExecOutput {
    /// Whether the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Both streams joined, for error reports.
    #[must_use]
    pub fn combined(&self) -> String {
        match (self.stdout.trim_end(), self.stderr.trim_end()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

/// Converts an exit status into a shell-style code.
pub(crate) fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_program_and_args() {
        let spec = CommandSpec::new("/bin/echo").args(["hello", "world"]);
        assert_eq!(spec.to_string(), "/bin/echo hello world");
    }

    #[test]
    fn combined_output_skips_empty_streams() {
        let out = ExecOutput {
            stdout: "ok\n".into(),
            stderr: String::new(),
            exit_code: 0,
        };
        assert_eq!(out.combined(), "ok");
        assert!(out.success());

        let both = ExecOutput {
            stdout: "a\n".into(),
            stderr: "b\n".into(),
            exit_code: 3,
        };
        assert_eq!(both.combined(), "a\nb");
        assert!(!both.success());
    }

    #[tokio::test]
    async fn file_output_creates_parent_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("logs").join("console.log");
        let spec = CommandSpec {
            output: OutputTarget::File(log.clone()),
            ..CommandSpec::new("/bin/true")
        };
        let _cmd = spec.to_command().expect("command");
        assert!(log.exists());
    }
}
