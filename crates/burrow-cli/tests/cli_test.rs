//! End-to-end tests of the `burrow` binary against a stand-in launcher.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

const FAKE_LAUNCHER: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    -r) root="$2"; shift 2 ;;
    -b|-w) shift 2 ;;
    -0|--link2symlink|--kill-on-exit) shift ;;
    *) break ;;
  esac
done
[ -d "$root" ] || { echo "missing root" >&2; exit 90; }
exec "$@"
"#;

struct Sandbox {
    dir: tempfile::TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let launcher = dir.path().join("fake-proot");
        std::fs::write(&launcher, FAKE_LAUNCHER).expect("write launcher");
        std::fs::set_permissions(&launcher, std::fs::Permissions::from_mode(0o755))
            .expect("chmod");
        let tree = dir.path().join("tree");
        std::fs::create_dir_all(tree.join("etc")).expect("tree");
        std::fs::write(tree.join("etc/os-release"), "NAME=Tree\n").expect("os-release");
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn tree_uri(&self) -> String {
        format!("file://{}", self.path().join("tree").display())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_burrow"));
        let _ = cmd
            .arg("--data-dir")
            .arg(self.path().join("data"))
            .arg("--launcher")
            .arg(self.path().join("fake-proot"))
            .env_remove("BURROW_DATA_DIR")
            .env_remove("BURROW_LAUNCHER")
            .env("BURROW_STOP_GRACE_MS", "1000")
            .env("BURROW_REAPER_INTERVAL_MS", "50");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.command().args(args).output().expect("run burrow")
    }

    fn console(&self, script: &str) -> Output {
        let mut child = self
            .command()
            .arg("console")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn console");
        child
            .stdin
            .take()
            .expect("stdin")
            .write_all(script.as_bytes())
            .expect("write script");
        child.wait_with_output().expect("console output")
    }

    fn data(&self, rel: &str) -> PathBuf {
        self.path().join("data").join(rel)
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn environment_exec_prints_output_and_status() {
    let sandbox = Sandbox::new();
    let uri = sandbox.tree_uri();
    assert!(sandbox.run(&["distro", "add", "tree", &uri]).status.success());
    let created = sandbox.run(&["env", "create", "tree"]);
    assert!(created.status.success(), "{}", stdout(&created));
    assert!(sandbox.data("environments/tree/rootfs/etc/os-release").is_file());

    let exec = sandbox.run(&["env", "exec", "tree", "echo", "hello"]);
    assert!(exec.status.success());
    let out = stdout(&exec);
    assert!(out.contains("hello"), "{out}");
    assert!(out.trim_end().ends_with("exit code 0"), "{out}");

    let failing = sandbox.run(&["env", "exec", "tree", "exit", "3"]);
    assert!(!failing.status.success());
    assert!(stdout(&failing).contains("exit code 3"));
}

#[test]
fn console_drives_a_container_lifecycle() {
    let sandbox = Sandbox::new();
    let uri = sandbox.tree_uri();
    let output = sandbox.console(&format!(
        "distro add tree {uri}\n\
         container create c1 tree\n\
         container start c1\n\
         container exec c1 echo from-inside\n\
         container stop c1\n\
         container ls\n\
         exit\n"
    ));
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("container c1 created on tree"), "{out}");
    assert!(out.contains("container c1 is running"), "{out}");
    assert!(out.contains("from-inside"), "{out}");
    assert!(out.contains("container c1 is stopped"), "{out}");
    assert!(out.contains("1 container(s)"), "{out}");
    assert!(sandbox.data("containers/c1/container.json").is_file());
}

#[test]
fn console_keeps_going_after_a_failed_command() {
    let sandbox = Sandbox::new();
    let output = sandbox.console("container start ghost\nnot-a-command\ndistro ls\n");
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("error: container not found: ghost"), "{out}");
    assert!(out.contains("distribution(s)"), "{out}");
}

#[test]
fn failed_command_exits_non_zero() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["container", "stop", "ghost"]);
    assert!(!output.status.success());
    assert!(stdout(&output).starts_with("error:"));
}

#[test]
fn standalone_start_and_exec_point_to_run_or_console() {
    let sandbox = Sandbox::new();
    let uri = sandbox.tree_uri();
    assert!(sandbox.run(&["distro", "add", "tree", &uri]).status.success());
    assert!(sandbox.run(&["container", "create", "c1", "tree"]).status.success());

    let start = sandbox.run(&["container", "start", "c1"]);
    assert!(!start.status.success());
    let out = stdout(&start);
    assert!(out.starts_with("error: container c1 would stop"), "{out}");
    assert!(out.contains("burrow run c1"), "{out}");

    let exec = sandbox.run(&["container", "exec", "c1", "echo", "hi"]);
    assert!(!exec.status.success());
    let out = stdout(&exec);
    assert!(out.contains("burrow console"), "{out}");
    assert!(!out.contains("hi\n"), "{out}");

    let ls = sandbox.run(&["container", "ls", "--json"]);
    assert!(stdout(&ls).contains("\"created\""), "{}", stdout(&ls));
}
