//! System-wide constants and default paths.

use std::path::PathBuf;

/// Application name used in CLI output and state files.
pub const APP_NAME: &str = "burrow";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "burrow";

/// Fallback data directory when no home directory is known.
pub const SYSTEM_DATA_DIR: &str = "/data/local/tmp/burrow";

/// Name of the syscall-interception launcher looked up on `PATH`.
pub const DEFAULT_LAUNCHER: &str = "proot";

/// Interpreter used when no explicit runtime version is requested.
pub const DEFAULT_PYTHON: &str = "python3";

/// Reaper poll interval.
pub const DEFAULT_REAPER_INTERVAL_MS: u64 = 500;

/// Grace period between SIGTERM and SIGKILL when stopping a container.
pub const DEFAULT_STOP_GRACE_MS: u64 = 5_000;

/// Free space kept in reserve on the staging filesystem.
pub const DEFAULT_MIN_FREE_BYTES: u64 = 64 * 1024 * 1024;

/// Search path handed to processes inside a root tree.
pub const GUEST_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Shell used for one-shot commands and the default entrypoint.
pub const GUEST_SHELL: &str = "/bin/sh";

/// Directory holding staged root-filesystem environments.
pub const ENVIRONMENTS_DIR: &str = "environments";

/// Directory holding container-private trees.
pub const CONTAINERS_DIR: &str = "containers";

/// Directory holding interpreter environments.
pub const VENVS_DIR: &str = "venvs";

/// Directory holding audit logs.
pub const LOGS_DIR: &str = "logs";

/// Subdirectories created for every container.
pub const CONTAINER_SUBDIRS: [&str; 4] = ["app", "data", "logs", "tmp"];

/// Metadata file written next to each container tree.
pub const CONTAINER_METADATA_FILE: &str = "container.json";

/// Metadata file written next to each environment root tree.
pub const ENVIRONMENT_METADATA_FILE: &str = "environment.json";

/// Configuration file name inside the data directory.
pub const CONFIG_FILE: &str = "config.json";

/// Append-only lifecycle event log inside the logs directory.
pub const LIFECYCLE_LOG_FILE: &str = "lifecycle.jsonl";

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;

/// Longest accepted entity name.
pub const MAX_NAME_LENGTH: usize = 64;

/// Returns the default data directory: `$HOME/.burrow`, or the system
/// fallback when no home directory is set.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME").map_or_else(
        || PathBuf::from(SYSTEM_DATA_DIR),
        |home| PathBuf::from(home).join(".burrow"),
    )
}
