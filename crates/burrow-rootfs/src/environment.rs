//! Staged environment records.

use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{EnvironmentId, EnvironmentStatus, Sha256Hash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named root tree staged from a distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Unique identifier.
    pub id: EnvironmentId,
    /// Operator-chosen name, unique among environments.
    pub name: String,
    /// Distribution the tree was staged from.
    pub distribution: String,
    /// Absolute path of the root tree.
    pub root_path: PathBuf,
    /// Staging status.
    pub status: EnvironmentStatus,
    /// When staging began.
    pub created_at: DateTime<Utc>,
    /// Digest of the archive the tree came from, if one was hashed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_digest: Option<Sha256Hash>,
    /// Reason the environment is in [`EnvironmentStatus::Error`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Environment {
    /// A fresh record in the `Staging` status.
    #[must_use]
    pub fn staging(name: &str, distribution: &str, root_path: PathBuf) -> Self {
        Self {
            id: EnvironmentId::generate(),
            name: name.to_string(),
            distribution: distribution.to_string(),
            root_path,
            status: EnvironmentStatus::Staging,
            created_at: Utc::now(),
            archive_digest: None,
            last_error: None,
        }
    }

    /// Whether the tree can be entered.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == EnvironmentStatus::Ready
    }

    /// Marks the record unusable with a reason.
    pub fn mark_error(&mut self, reason: impl Into<String>) {
        self.status = EnvironmentStatus::Error;
        self.last_error = Some(reason.into());
    }
}

/// Reads a metadata record.
///
/// # Errors
///
/// Returns an error if the file is missing or malformed.
pub fn read_metadata(path: &Path) -> Result<Environment> {
    let content = std::fs::read_to_string(path).map_err(|e| BurrowError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

/// Writes a metadata record atomically.
///
/// # Errors
///
/// Returns an error if the record cannot be serialized or written.
pub fn write_metadata(path: &Path, environment: &Environment) -> Result<()> {
    let json = serde_json::to_string_pretty(environment)?;
    crate::storage::write_atomic(path, json.as_bytes())
}
