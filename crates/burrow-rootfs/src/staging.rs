//! Atomic staging of a distribution root tree.
//!
//! Everything happens inside a hidden `.staging-*` directory next to the
//! final location. Only a complete tree with its metadata record is renamed
//! into place, so a crash or failure never leaves a half-populated
//! environment under its real name.

use std::path::Path;

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{Distribution, EnvironmentStatus, Sha256Hash};
use tokio_util::sync::CancellationToken;

use crate::environment::{Environment, write_metadata};
use crate::extract::{copy_tree, estimated_unpacked_size, extract_archive, tree_size};
use crate::hash::{hash_file, validate_hash};
use crate::source::{ArchiveSource, download, download_file_name, resolve_source};
use crate::storage::{StorageLayout, remove_tree};

/// Inputs of a single staging run.
#[derive(Debug)]
pub struct StagingRequest<'a> {
    /// Store the environment lands in.
    pub layout: &'a StorageLayout,
    /// Name of the new environment.
    pub name: &'a str,
    /// Distribution providing the tree.
    pub distribution: &'a Distribution,
    /// Free bytes that must remain after staging.
    pub min_free_bytes: u64,
}

/// Stages `request.distribution` under `request.name`.
///
/// Blocking; call from a blocking task. On failure the staging directory
/// is removed before the error is returned.
///
/// # Errors
///
/// Returns an error if the source cannot be resolved, fetched, verified,
/// or unpacked, if storage is insufficient, or if `cancel` fires.
pub fn stage(request: &StagingRequest<'_>, cancel: &CancellationToken) -> Result<Environment> {
    let staging_dir = request.layout.new_staging_dir(request.name);
    std::fs::create_dir_all(&staging_dir).map_err(|e| BurrowError::io(&staging_dir, e))?;
    tracing::info!(
        name = request.name,
        distribution = %request.distribution.name,
        staging = %staging_dir.display(),
        "staging environment"
    );

    match stage_into(request, &staging_dir, cancel) {
        Ok(environment) => Ok(environment),
        Err(e) => {
            tracing::warn!(name = request.name, error = %e, "staging failed, rolling back");
            if let Err(cleanup) = remove_tree(&staging_dir) {
                tracing::error!(path = %staging_dir.display(), error = %cleanup, "failed to remove staging directory");
            }
            Err(e)
        }
    }
}

fn stage_into(
    request: &StagingRequest<'_>,
    staging_dir: &Path,
    cancel: &CancellationToken,
) -> Result<Environment> {
    let rootfs = staging_dir.join("rootfs");
    let digest = match resolve_source(&request.distribution.archive)? {
        ArchiveSource::Directory(src) => {
            ensure_space(request, tree_size(&src)?)?;
            let _ = copy_tree(&src, &rootfs, cancel)?;
            None
        }
        ArchiveSource::Tarball(archive) => {
            let digest = verify(&archive, request.distribution.sha256.as_deref())?;
            ensure_space(request, estimated_unpacked_size(&archive)?)?;
            let _ = extract_archive(&archive, &rootfs, cancel)?;
            Some(digest)
        }
        ArchiveSource::Remote { url } => {
            let archive = staging_dir.join(download_file_name(&url));
            let _ = download(&url, &archive, cancel)?;
            let digest = verify(&archive, request.distribution.sha256.as_deref())?;
            ensure_space(request, estimated_unpacked_size(&archive)?)?;
            let _ = extract_archive(&archive, &rootfs, cancel)?;
            std::fs::remove_file(&archive).map_err(|e| BurrowError::io(&archive, e))?;
            Some(digest)
        }
    };

    let is_empty = std::fs::read_dir(&rootfs)
        .map_err(|e| BurrowError::io(&rootfs, e))?
        .next()
        .is_none();
    if is_empty {
        return Err(BurrowError::Staging {
            name: request.name.to_string(),
            reason: "distribution produced an empty root tree".into(),
        });
    }
    if cancel.is_cancelled() {
        return Err(BurrowError::Cancelled {
            operation: format!("staging of {}", request.name),
        });
    }

    let final_dir = request.layout.environment_dir(request.name);
    let mut environment = Environment::staging(
        request.name,
        &request.distribution.name,
        request.layout.rootfs_path(request.name),
    );
    environment.status = EnvironmentStatus::Ready;
    environment.archive_digest = digest;
    write_metadata(
        &staging_dir.join(burrow_common::constants::ENVIRONMENT_METADATA_FILE),
        &environment,
    )?;

    if final_dir.exists() {
        return Err(BurrowError::DuplicateName {
            kind: "environment",
            name: request.name.to_string(),
        });
    }
    std::fs::rename(staging_dir, &final_dir).map_err(|e| BurrowError::io(&final_dir, e))?;
    tracing::info!(name = request.name, root = %environment.root_path.display(), "environment ready");
    Ok(environment)
}

fn verify(archive: &Path, declared: Option<&str>) -> Result<Sha256Hash> {
    match declared {
        Some(hex) => validate_hash(archive, &Sha256Hash::from_hex(hex)?),
        None => hash_file(archive),
    }
}

fn ensure_space(request: &StagingRequest<'_>, required: u64) -> Result<()> {
    let available = request.layout.available_bytes()?;
    let needed = required.saturating_add(request.min_free_bytes);
    tracing::debug!(required, available, reserve = request.min_free_bytes, "free-space check");
    if needed > available {
        return Err(BurrowError::Staging {
            name: request.name.to_string(),
            reason: format!(
                "insufficient storage: need {needed} bytes including reserve, {available} available"
            ),
        });
    }
    Ok(())
}
