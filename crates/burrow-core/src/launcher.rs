//! Command builder for the syscall-interception launcher.
//!
//! The launcher (proot or a compatible tool) runs a program with its
//! filesystem view rooted in a staged tree, emulating `chroot` and bind
//! mounts by intercepting syscalls. It needs no privileges and provides no
//! isolation: the guest shares the host kernel, PID space, network, and
//! user id.
//!
//! Argument contract:
//!
//! ```text
//! <launcher> [-0] --link2symlink --kill-on-exit -r <root>
//!            [-b <host>[:<guest>]]... -w <cwd> <program> [args...]
//! ```

use std::path::{Path, PathBuf};

use burrow_common::constants::{GUEST_PATH, GUEST_SHELL};

use crate::spec::{CommandSpec, OutputTarget, StdinMode};

/// Host paths bound into every guest.
pub const HOST_SYSTEM_BINDS: [&str; 3] = ["/dev", "/proc", "/sys"];

/// Locates the launcher binary.
///
/// A value containing a path separator must point at an existing file;
/// a bare name is looked up on `PATH`.
#[must_use]
pub fn resolve_launcher(launcher: &Path) -> Option<PathBuf> {
    if launcher.components().count() > 1 {
        launcher.is_file().then(|| launcher.to_path_buf())
    } else {
        which::which(launcher).ok()
    }
}

/// Builder for a rooted launcher invocation.
#[derive(Debug, Clone)]
pub struct LauncherCommand {
    launcher: PathBuf,
    root: PathBuf,
    binds: Vec<(String, Option<String>)>,
    working_dir: String,
    fake_root: bool,
    guest_env: Vec<(String, String)>,
    launcher_env: Vec<(String, String)>,
    argv: Vec<String>,
}

impl LauncherCommand {
    /// Starts a builder rooted at `root`, running the guest shell by default.
    #[must_use]
    pub fn new(launcher: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            launcher: launcher.into(),
            root: root.into(),
            binds: HOST_SYSTEM_BINDS
                .iter()
                .map(|p| ((*p).to_string(), None))
                .collect(),
            working_dir: "/".into(),
            fake_root: true,
            guest_env: vec![
                ("PATH".into(), GUEST_PATH.into()),
                ("HOME".into(), "/root".into()),
                ("TERM".into(), "xterm-256color".into()),
                ("LANG".into(), "C.UTF-8".into()),
            ],
            launcher_env: Vec::new(),
            argv: vec![GUEST_SHELL.into()],
        }
    }

    /// Binds a host path at a guest path.
    #[must_use]
    pub fn bind(mut self, host: impl Into<String>, guest: impl Into<String>) -> Self {
        self.binds.push((host.into(), Some(guest.into())));
        self
    }

    /// Sets the guest working directory.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Whether the guest sees itself as uid 0.
    #[must_use]
    pub const fn fake_root(mut self, enabled: bool) -> Self {
        self.fake_root = enabled;
        self
    }

    /// Sets a guest environment variable, replacing an earlier value.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.guest_env.retain(|(k, _)| *k != key);
        self.guest_env.push((key, value.into()));
        self
    }

    /// Sets an environment variable read by the launcher itself.
    #[must_use]
    pub fn launcher_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.launcher_env.push((key.into(), value.into()));
        self
    }

    /// Sets the guest argv. An empty argv keeps the default shell.
    #[must_use]
    pub fn argv(mut self, argv: Vec<String>) -> Self {
        if !argv.is_empty() {
            self.argv = argv;
        }
        self
    }

    /// Runs `command` through the guest shell (`/bin/sh -c <command>`).
    #[must_use]
    pub fn shell_command(self, command: &str) -> Self {
        self.argv(vec![GUEST_SHELL.into(), "-c".into(), command.into()])
    }

    /// Root tree the launcher is pointed at.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Launcher arguments, excluding the launcher itself.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.fake_root {
            args.push("-0".into());
        }
        args.push("--link2symlink".into());
        args.push("--kill-on-exit".into());
        args.push("-r".into());
        args.push(self.root.display().to_string());
        for (host, guest) in &self.binds {
            args.push("-b".into());
            args.push(guest.as_ref().map_or_else(|| host.clone(), |g| format!("{host}:{g}")));
        }
        args.push("-w".into());
        args.push(self.working_dir.clone());
        args.extend(self.argv.iter().cloned());
        args
    }

    /// Converts the invocation into a supervisor command spec.
    ///
    /// The launcher runs with a cleared environment: only the guest
    /// variables and the launcher's own variables are passed.
    #[must_use]
    pub fn into_spec(self, stdin: StdinMode, output: OutputTarget) -> CommandSpec {
        let args = self.args();
        let mut env = self.guest_env;
        env.extend(self.launcher_env);
        CommandSpec {
            program: self.launcher,
            args,
            working_dir: None,
            env,
            clear_env: true,
            stdin,
            output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_args_root_and_bind_system_paths() {
        let args = LauncherCommand::new("proot", "/data/env/rootfs").args();
        assert_eq!(
            args,
            vec![
                "-0",
                "--link2symlink",
                "--kill-on-exit",
                "-r",
                "/data/env/rootfs",
                "-b",
                "/dev",
                "-b",
                "/proc",
                "-b",
                "/sys",
                "-w",
                "/",
                "/bin/sh",
            ]
        );
    }

    #[test]
    fn guest_program_follows_working_dir_without_separator() {
        let args = LauncherCommand::new("proot", "/r")
            .argv(vec!["/usr/bin/env".into(), "-i".into()])
            .args();
        assert!(!args.iter().any(|a| a == "--"));
        let cwd = args.iter().position(|a| a == "-w").expect("-w");
        assert_eq!(&args[cwd..], ["-w", "/", "/usr/bin/env", "-i"]);
    }

    #[test]
    fn binds_and_shell_command_are_appended() {
        let args = LauncherCommand::new("proot", "/r")
            .fake_root(false)
            .bind("/host/data", "/data")
            .working_dir("/data")
            .shell_command("id -u")
            .args();
        assert!(!args.contains(&"-0".to_string()));
        assert!(args.contains(&"/host/data:/data".to_string()));
        assert_eq!(&args[args.len() - 5..], ["-w", "/data", "/bin/sh", "-c", "id -u"]);
    }

    #[test]
    fn empty_argv_keeps_default_shell() {
        let args = LauncherCommand::new("proot", "/r").argv(Vec::new()).args();
        assert_eq!(args.last().map(String::as_str), Some("/bin/sh"));
    }

    #[test]
    fn spec_clears_env_and_overrides_guest_vars() {
        let spec = LauncherCommand::new("/usr/bin/proot", "/r")
            .env("HOME", "/home/user")
            .launcher_env("PROOT_TMP_DIR", "/tmp/burrow")
            .into_spec(StdinMode::Null, OutputTarget::Null);
        assert!(spec.clear_env);
        assert_eq!(spec.program, PathBuf::from("/usr/bin/proot"));
        let homes: Vec<_> = spec.env.iter().filter(|(k, _)| k == "HOME").collect();
        assert_eq!(homes, vec![&("HOME".to_string(), "/home/user".to_string())]);
        assert!(spec.env.iter().any(|(k, _)| k == "PROOT_TMP_DIR"));
    }

    #[test]
    fn resolve_launcher_checks_explicit_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("proot");
        assert!(resolve_launcher(&missing).is_none());
        std::fs::write(&missing, b"#!/bin/sh\n").expect("write");
        assert_eq!(resolve_launcher(&missing), Some(missing));
    }
}
