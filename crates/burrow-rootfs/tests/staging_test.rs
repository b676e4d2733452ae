//! Integration tests for staging, entry, execution, and destruction of
//! environments.
//!
//! A stand-in launcher script honours the launcher's argv contract and
//! runs the guest command on the host, so these tests need no proot.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use burrow_common::config::BurrowConfig;
use burrow_common::error::{BurrowError, ErrorKind};
use burrow_common::types::{Distribution, EnvironmentStatus};
use burrow_core::Supervisor;
use burrow_rootfs::{EntrySpec, RootfsManager};
use tokio_util::sync::CancellationToken;

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

fn write_launcher(dir: &Path) -> PathBuf {
    let path = dir.join("fake-proot");
    std::fs::write(&path, FAKE_LAUNCHER).expect("write launcher");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

fn write_archive(dir: &Path) -> PathBuf {
    let path = dir.join("alpine-mini.tar.gz");
    let file = std::fs::File::create(&path).expect("create archive");
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, body) in [
        ("etc/os-release", &b"NAME=\"Alpine Mini\"\n"[..]),
        ("etc/hostname", &b"burrow\n"[..]),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, body).expect("append");
    }
    let encoder = builder.into_inner().expect("finish tar");
    let _ = encoder.finish().expect("finish gzip");
    path
}

struct Fixture {
    _dir: tempfile::TempDir,
    manager: RootfsManager,
    supervisor: Supervisor,
    data_dir: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path().join("data");
    let mut config = BurrowConfig::with_data_dir(&data_dir);
    config.launcher = write_launcher(dir.path());
    config.min_free_bytes = 0;
    let supervisor = Supervisor::start(Duration::from_millis(50));
    let manager = RootfsManager::open(&config, supervisor.clone()).expect("open manager");
    let archive = write_archive(dir.path());
    manager
        .register_distribution(Distribution {
            name: "alpine-mini".into(),
            display_name: "Alpine Mini".into(),
            package_manager: "apk".into(),
            archive: format!("tar://{}", archive.display()),
            sha256: None,
        })
        .expect("register");
    Fixture {
        _dir: dir,
        manager,
        supervisor,
        data_dir,
    }
}

fn staging_leftovers(data_dir: &Path) -> usize {
    std::fs::read_dir(data_dir.join("environments"))
        .expect("ls")
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with(".staging-"))
        .count()
}

#[tokio::test]
async fn staged_environment_runs_commands() {
    let fx = fixture();
    let env = fx
        .manager
        .create_environment("alpine-mini", "env1", &CancellationToken::new())
        .await
        .expect("create");
    assert_eq!(env.status, EnvironmentStatus::Ready);
    assert!(env.archive_digest.is_some());
    assert!(env.root_path.join("etc/os-release").is_file());

    let out = fx
        .manager
        .execute_in_environment("env1", "echo ok", &CancellationToken::new())
        .await
        .expect("exec");
    assert_eq!(out.exit_code, 0);
    assert_eq!(out.stdout.trim(), "ok");

    let id = fx
        .manager
        .execute_in_environment("env1", "id -u", &CancellationToken::new())
        .await
        .expect("exec");
    assert!(!id.stdout.trim().is_empty());
    assert!(id.stdout.trim().chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test]
async fn non_zero_exit_is_a_result_not_an_error() {
    let fx = fixture();
    let _ = fx
        .manager
        .create_environment("alpine-mini", "env1", &CancellationToken::new())
        .await
        .expect("create");
    let out = fx
        .manager
        .execute_in_environment("env1", "echo boom >&2; exit 3", &CancellationToken::new())
        .await
        .expect("exec");
    assert_eq!(out.exit_code, 3);
    assert_eq!(out.stderr.trim(), "boom");
}

#[tokio::test]
async fn duplicate_name_is_rejected() {
    let fx = fixture();
    let _ = fx
        .manager
        .create_environment("alpine-mini", "env1", &CancellationToken::new())
        .await
        .expect("create");
    let err = fx
        .manager
        .create_environment("alpine-mini", "env1", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BurrowError::DuplicateName { .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn cancelled_staging_leaves_nothing_behind() {
    let fx = fixture();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = fx
        .manager
        .create_environment("alpine-mini", "env1", &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Staging);
    assert!(fx.manager.environment("env1").is_err());
    assert!(!fx.data_dir.join("environments/env1").exists());
    assert_eq!(staging_leftovers(&fx.data_dir), 0);

    let _ = fx
        .manager
        .create_environment("alpine-mini", "env1", &CancellationToken::new())
        .await
        .expect("name is free again");
}

#[tokio::test]
async fn corrupt_archive_is_a_staging_error() {
    let fx = fixture();
    let bogus = fx.data_dir.join("bogus.tar.gz");
    std::fs::write(&bogus, b"definitely not gzip").expect("write");
    fx.manager
        .register_distribution(Distribution {
            name: "bogus".into(),
            display_name: "Bogus".into(),
            package_manager: "none".into(),
            archive: format!("tar://{}", bogus.display()),
            sha256: None,
        })
        .expect("register");

    let err = fx
        .manager
        .create_environment("bogus", "env1", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BurrowError::Staging { .. }));
    assert!(err.to_string().contains("corrupt archive"));
    assert_eq!(staging_leftovers(&fx.data_dir), 0);
}

#[tokio::test]
async fn destroy_refuses_while_a_process_is_inside() {
    let fx = fixture();
    let _ = fx
        .manager
        .create_environment("alpine-mini", "env1", &CancellationToken::new())
        .await
        .expect("create");
    let handle = fx
        .manager
        .enter_environment("env1", EntrySpec::default())
        .expect("enter");
    assert!(handle.is_alive());

    let err = fx.manager.destroy_environment("env1").unwrap_err();
    assert!(matches!(err, BurrowError::InUse { .. }));

    let _ = fx
        .supervisor
        .terminate(&handle, true, Duration::from_secs(2))
        .await
        .expect("terminate");
    fx.manager.destroy_environment("env1").expect("destroy");
    assert!(!fx.data_dir.join("environments/env1").exists());
    assert!(fx.manager.environment("env1").is_err());
}

#[tokio::test]
async fn missing_launcher_is_a_launch_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src = dir.path().join("tree");
    std::fs::create_dir_all(src.join("bin")).expect("mkdir");
    std::fs::write(src.join("bin/marker"), b"x").expect("write");
    let mut config = BurrowConfig::with_data_dir(dir.path().join("data"));
    config.launcher = dir.path().join("no-such-launcher");
    config.min_free_bytes = 0;
    let manager = RootfsManager::open(&config, Supervisor::start(Duration::from_millis(50)))
        .expect("open");
    manager
        .register_distribution(Distribution {
            name: "tree".into(),
            display_name: "Tree".into(),
            package_manager: "none".into(),
            archive: format!("file://{}", src.display()),
            sha256: None,
        })
        .expect("register");
    let _ = manager
        .create_environment("tree", "env1", &CancellationToken::new())
        .await
        .expect("create");

    let err = manager
        .execute_in_environment("env1", "true", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BurrowError::Launch { .. }));
    assert_eq!(err.kind(), ErrorKind::Process);
}

#[tokio::test]
async fn environments_survive_reopen() {
    let fx = fixture();
    let _ = fx
        .manager
        .create_environment("alpine-mini", "env1", &CancellationToken::new())
        .await
        .expect("create");
    let mut config = BurrowConfig::with_data_dir(&fx.data_dir);
    config.launcher = fx.data_dir.join("unused");
    let reopened = RootfsManager::open(&config, fx.supervisor.clone()).expect("reopen");
    let env = reopened.environment("env1").expect("env1");
    assert_eq!(env.status, EnvironmentStatus::Ready);
    assert_eq!(reopened.list_environments().len(), 1);
}
