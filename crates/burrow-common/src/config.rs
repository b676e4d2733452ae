//! Global configuration model for the Burrow runtime.
//!
//! Values resolve in order: built-in defaults, `config.json` in the data
//! directory, then `BURROW_*` environment variables. The CLI applies its
//! flags last.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{BurrowError, Result};

/// Root configuration for the Burrow runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BurrowConfig {
    /// Base directory for all staged trees, containers, and metadata.
    pub data_dir: PathBuf,
    /// Launcher binary, either a path or a name looked up on `PATH`.
    pub launcher: PathBuf,
    /// Extra environment for the launcher process itself.
    pub launcher_env: BTreeMap<String, String>,
    /// Reaper poll interval in milliseconds.
    pub reaper_interval_ms: u64,
    /// Grace period before a stop escalates to SIGKILL, in milliseconds.
    pub stop_grace_ms: u64,
    /// Free bytes that staging must leave untouched.
    pub min_free_bytes: u64,
    /// Interpreter used to bootstrap interpreter environments.
    pub python: String,
}

impl Default for BurrowConfig {
    fn default() -> Self {
        Self {
            data_dir: constants::default_data_dir(),
            launcher: PathBuf::from(constants::DEFAULT_LAUNCHER),
            launcher_env: BTreeMap::new(),
            reaper_interval_ms: constants::DEFAULT_REAPER_INTERVAL_MS,
            stop_grace_ms: constants::DEFAULT_STOP_GRACE_MS,
            min_free_bytes: constants::DEFAULT_MIN_FREE_BYTES,
            python: constants::DEFAULT_PYTHON.to_string(),
        }
    }
}

impl BurrowConfig {
    /// Creates a default configuration rooted at `data_dir`.
    #[must_use]
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Resolves the configuration for `data_dir` (or the default one),
    /// merging `config.json` and `BURROW_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be
    /// read or parsed, an override is not a number, or the reaper
    /// interval is zero.
    pub fn load(data_dir: Option<&Path>) -> Result<Self> {
        let data_dir = data_dir
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("BURROW_DATA_DIR").map(PathBuf::from))
            .unwrap_or_else(constants::default_data_dir);

        let path = data_dir.join(constants::CONFIG_FILE);
        let mut config = if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| BurrowError::io(&path, e))?;
            let config: Self = serde_json::from_str(&content)?;
            tracing::debug!(path = %path.display(), "loaded configuration file");
            config
        } else {
            Self::default()
        };
        config.data_dir = data_dir;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the runtime cannot operate with.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Config`] if the reaper interval is zero.
    pub fn validate(&self) -> Result<()> {
        if self.reaper_interval_ms == 0 {
            return Err(BurrowError::Config {
                message: "reaper_interval_ms must be greater than zero".into(),
            });
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(launcher) = std::env::var_os("BURROW_LAUNCHER") {
            self.launcher = PathBuf::from(launcher);
        }
        if let Some(ms) = env_u64("BURROW_REAPER_INTERVAL_MS")? {
            self.reaper_interval_ms = ms;
        }
        if let Some(ms) = env_u64("BURROW_STOP_GRACE_MS")? {
            self.stop_grace_ms = ms;
        }
        Ok(())
    }

    /// Reaper poll interval.
    #[must_use]
    pub const fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }

    /// Grace period between SIGTERM and SIGKILL.
    #[must_use]
    pub const fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(value) => value.parse().map(Some).map_err(|_| BurrowError::Config {
            message: format!("{key} must be an integer, got {value:?}"),
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_without_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = BurrowConfig::load(Some(dir.path())).expect("load");
        assert_eq!(config.data_dir, dir.path());
        assert_eq!(config.stop_grace_ms, constants::DEFAULT_STOP_GRACE_MS);
    }

    #[test]
    fn load_merges_partial_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(constants::CONFIG_FILE),
            r#"{ "stop_grace_ms": 250, "python": "python3.12" }"#,
        )
        .expect("write");
        let config = BurrowConfig::load(Some(dir.path())).expect("load");
        assert_eq!(config.stop_grace_ms, 250);
        assert_eq!(config.python, "python3.12");
        assert_eq!(config.reaper_interval_ms, constants::DEFAULT_REAPER_INTERVAL_MS);
    }

    #[test]
    fn load_rejects_malformed_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(constants::CONFIG_FILE), "{ nope").expect("write");
        assert!(BurrowConfig::load(Some(dir.path())).is_err());
    }

    #[test]
    fn load_rejects_zero_reaper_interval() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(constants::CONFIG_FILE),
            r#"{ "reaper_interval_ms": 0 }"#,
        )
        .expect("write");
        let err = BurrowConfig::load(Some(dir.path())).expect_err("zero interval");
        assert!(matches!(err, BurrowError::Config { .. }), "{err}");
    }

    #[test]
    fn durations_follow_millisecond_fields() {
        let config = BurrowConfig {
            reaper_interval_ms: 100,
            stop_grace_ms: 2_000,
            ..BurrowConfig::default()
        };
        assert_eq!(config.reaper_interval(), Duration::from_millis(100));
        assert_eq!(config.stop_grace(), Duration::from_secs(2));
    }
}
