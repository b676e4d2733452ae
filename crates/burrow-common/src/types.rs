//! Domain primitive types used across the Burrow workspace.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BurrowError, Result};

/// Unique identifier for a container instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random container ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a staged root-filesystem environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvironmentId(String);

impl EnvironmentId {
    /// Generates a random environment ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 hash digest used for archive verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sha256Hash(String);

impl Sha256Hash {
    /// Creates a hash from a hex-encoded string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid 64-character hex string.
    pub fn from_hex(hex: impl Into<String>) -> Result<Self> {
        let hex = hex.into().to_ascii_lowercase();
        if hex.len() != crate::constants::SHA256_HEX_LENGTH
            || !hex.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(BurrowError::Config {
                message: format!("invalid SHA-256 hex string: {hex}"),
            });
        }
        Ok(Self(hex))
    }

    /// Returns the hex-encoded hash string.
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}

/// Lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    /// Container has been created but never started.
    Created,
    /// The container's main process is alive.
    Running,
    /// Container was stopped on request.
    Stopped,
    /// The main process died without being asked to.
    Exited,
    /// Container hit an unrecoverable failure and needs operator cleanup.
    Error,
}

impl ContainerState {
    /// Whether `start` is meaningful from this state.
    #[must_use]
    pub const fn can_start(self) -> bool {
        matches!(self, Self::Created | Self::Stopped)
    }

    /// Whether the state machine permits moving from `self` to `to`.
    ///
    /// `Error` is reachable from anywhere, `Stopped` is reachable from
    /// anywhere because stop never wedges, and `Exited` only follows
    /// `Running`.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        match to {
            Self::Error | Self::Stopped => true,
            Self::Running => self.can_start(),
            Self::Exited => matches!(self, Self::Running),
            Self::Created => false,
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Exited => write!(f, "exited"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Staging status of a root-filesystem environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentStatus {
    /// Known but not staged on disk.
    Unstaged,
    /// Extraction or copy is in flight.
    Staging,
    /// The root tree is complete and usable.
    Ready,
    /// Staging was interrupted or the tree is unusable.
    Error,
}

impl fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unstaged => write!(f, "unstaged"),
            Self::Staging => write!(f, "staging"),
            Self::Ready => write!(f, "ready"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Catalog entry describing a Linux distribution root tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    /// Short identifier, e.g. `alpine`.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// Package manager shipped in the tree (`apk`, `apt`, `pacman`, ...).
    pub package_manager: String,
    /// Archive URI: `file://<dir>`, `tar://<archive>`, or `http(s)://`.
    pub archive: String,
    /// Expected SHA-256 of the archive, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Resource and runtime hints for a container.
///
/// These values are ADVISORY. Nothing in this system enforces memory, CPU,
/// or port declarations: there are no cgroups and no network namespaces.
/// Environment variables are handed to the main process and volumes are
/// forwarded to the launcher as bind declarations; neither is isolation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfiguration {
    /// Declared memory ceiling in bytes (not enforced).
    #[serde(default)]
    pub memory_limit_bytes: Option<u64>,
    /// Declared CPU quota as a fraction of one CPU (not enforced).
    #[serde(default)]
    pub cpu_quota: Option<f64>,
    /// Declared `host:guest` volume binds.
    #[serde(default)]
    pub volumes: Vec<String>,
    /// Environment variables for the main process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Declared ports (not enforced, not forwarded).
    #[serde(default)]
    pub ports: Vec<u16>,
    /// Main process argv. Empty means the default shell.
    #[serde(default)]
    pub entrypoint: Vec<String>,
    /// Working directory inside the root tree.
    #[serde(default)]
    pub working_dir: Option<String>,
}

impl ContainerConfiguration {
    /// Parses `host:guest` volume declarations.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a declaration without both halves.
    pub fn volume_binds(&self) -> Result<Vec<(String, String)>> {
        self.volumes
            .iter()
            .map(|v| match v.split_once(':') {
                Some((host, guest)) if !host.is_empty() && guest.starts_with('/') => {
                    Ok((host.to_string(), guest.to_string()))
                }
                _ => Err(BurrowError::Config {
                    message: format!("volume {v:?} must be <host-path>:<absolute-guest-path>"),
                }),
            })
            .collect()
    }
}

/// Validates a name used as an on-disk directory component.
///
/// # Errors
///
/// Returns [`BurrowError::InvalidName`] if the name is empty, too long,
/// starts with a dot, or contains characters outside `[A-Za-z0-9._-]`.
pub fn validate_name(kind: &'static str, name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("must not be empty")
    } else if name.len() > crate::constants::MAX_NAME_LENGTH {
        Some("must be at most 64 characters")
    } else if name.starts_with('.') || name.starts_with('-') {
        Some("must not start with '.' or '-'")
    } else if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        Some("may only contain letters, digits, '.', '_' and '-'")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(BurrowError::InvalidName {
            kind,
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
