//! Integration tests for the interpreter-environment manager, driven by a
//! shell-script toolchain so they need no Python installation.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use burrow_common::error::{BurrowError, ErrorKind};
use burrow_core::{CommandSpec, Supervisor};
use burrow_venv::{InterpreterManager, RuntimeToolchain};
use tokio_util::sync::CancellationToken;

/// Toolchain whose bootstrap succeeds only for versions starting with "3".
#[derive(Debug)]
struct ScriptToolchain;

impl RuntimeToolchain for ScriptToolchain {
    fn default_version(&self) -> String {
        "3.12".into()
    }

    fn bootstrap_command(&self, root: &Path, runtime_version: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh").args([
            "-c".to_string(),
            r#"case "$2" in
                 3*) mkdir -p "$1/bin" && touch "$1/bin/python" "$1/pyvenv.cfg" ;;
                 half) mkdir -p "$1/bin" ;;
                 *) echo "no interpreter for $2" >&2; exit 2 ;;
               esac"#
                .to_string(),
            "sh".to_string(),
            root.display().to_string(),
            runtime_version.to_string(),
        ])
    }

    fn marker_files(&self, root: &Path) -> Vec<PathBuf> {
        vec![root.join("bin/python"), root.join("pyvenv.cfg")]
    }

    fn install_command(&self, _root: &Path, package: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh").args([
            "-c".to_string(),
            r#"case "$1" in
                 bad*) echo "no matching distribution for $1" >&2; exit 1 ;;
                 *) echo "installed $1" ;;
               esac"#
                .to_string(),
            "sh".to_string(),
            package.to_string(),
        ])
    }
}

fn manager(dir: &Path) -> InterpreterManager {
    InterpreterManager::with_toolchain(
        dir,
        Arc::new(ScriptToolchain),
        Supervisor::start(Duration::from_millis(50)),
    )
    .expect("open")
}

#[tokio::test]
async fn create_registers_bootstrapped_environment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let venvs = manager(dir.path());
    let env = venvs
        .create_environment("web", None, &CancellationToken::new())
        .await
        .expect("create");
    assert_eq!(env.runtime_version, "3.12");
    assert!(env.root_path.join("pyvenv.cfg").is_file());
    assert!(!env.active);
    assert_eq!(venvs.list_environments().len(), 1);

    let err = venvs
        .create_environment("web", Some("3.11"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BurrowError::DuplicateName { .. }));
}

#[tokio::test]
async fn failed_bootstrap_reports_output_and_cleans_up() {
    let dir = tempfile::tempdir().expect("tempdir");
    let venvs = manager(dir.path());
    let err = venvs
        .create_environment("old", Some("2.7"), &CancellationToken::new())
        .await
        .unwrap_err();
    match &err {
        BurrowError::Creation { output, .. } => assert!(output.contains("no interpreter for 2.7")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.kind(), ErrorKind::Process);
    assert!(!dir.path().join("venvs/old").exists());
    assert!(venvs.environment("old").is_err());
}

#[tokio::test]
async fn missing_markers_are_a_creation_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let venvs = manager(dir.path());
    let err = venvs
        .create_environment("half", Some("half"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BurrowError::Creation { .. }));
    assert!(!dir.path().join("venvs/half").exists());
}

#[tokio::test]
async fn install_appends_only_on_success() {
    let dir = tempfile::tempdir().expect("tempdir");
    let venvs = manager(dir.path());
    let _ = venvs
        .create_environment("web", None, &CancellationToken::new())
        .await
        .expect("create");

    let env = venvs
        .install_package("web", "requests", &CancellationToken::new())
        .await
        .expect("install");
    assert_eq!(env.packages, vec!["requests"]);

    let err = venvs
        .install_package("web", "bad-package", &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        BurrowError::Install {
            exit_code, output, ..
        } => {
            assert_eq!(exit_code, 1);
            assert!(output.contains("no matching distribution"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(venvs.environment("web").expect("web").packages, vec!["requests"]);
}

#[tokio::test]
async fn only_one_environment_is_active() {
    let dir = tempfile::tempdir().expect("tempdir");
    let venvs = manager(dir.path());
    for name in ["a", "b"] {
        let _ = venvs
            .create_environment(name, None, &CancellationToken::new())
            .await
            .expect("create");
    }
    let before = std::env::var_os("VIRTUAL_ENV");

    let _ = venvs.activate_environment("a").expect("activate a");
    let _ = venvs.activate_environment("b").expect("activate b");
    let active: Vec<_> = venvs
        .list_environments()
        .into_iter()
        .filter(|e| e.active)
        .map(|e| e.name)
        .collect();
    assert_eq!(active, vec!["b"]);
    assert_eq!(venvs.active().map(|e| e.name).as_deref(), Some("b"));
    assert_eq!(std::env::var_os("VIRTUAL_ENV"), before);

    let err = venvs.activate_environment("ghost").unwrap_err();
    assert!(matches!(err, BurrowError::NotFound { .. }));
}

#[tokio::test]
async fn registry_survives_reopen_and_remove() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let venvs = manager(dir.path());
        let _ = venvs
            .create_environment("web", None, &CancellationToken::new())
            .await
            .expect("create");
        let _ = venvs
            .install_package("web", "flask", &CancellationToken::new())
            .await
            .expect("install");
        let _ = venvs.activate_environment("web").expect("activate");
    }
    let venvs = manager(dir.path());
    let env = venvs.environment("web").expect("reloaded");
    assert!(env.active);
    assert_eq!(env.packages, vec!["flask"]);

    venvs.remove_environment("web").await.expect("remove");
    assert!(!env.root_path.exists());
    assert!(manager(dir.path()).list_environments().is_empty());
}

#[tokio::test]
async fn cancelled_bootstrap_leaves_no_entry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let venvs = manager(dir.path());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = venvs
        .create_environment("web", None, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, BurrowError::Cancelled { .. }));
    assert!(venvs.environment("web").is_err());
}

#[tokio::test]
async fn interrupted_bootstrap_does_not_block_the_name() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let venvs = manager(dir.path());
        let _ = venvs
            .create_environment("web", None, &CancellationToken::new())
            .await
            .expect("create");
    }
    let leftover = dir.path().join("venvs/api");
    std::fs::create_dir_all(leftover.join("bin")).expect("leftover");

    let venvs = manager(dir.path());
    assert!(!leftover.exists());
    assert!(venvs.environment("web").is_ok());
    let env = venvs
        .create_environment("api", None, &CancellationToken::new())
        .await
        .expect("name is free again");
    assert!(env.root_path.join("pyvenv.cfg").is_file());
}
