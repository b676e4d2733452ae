//! Archive source protocol handlers.
//!
//! Supports `file://` (local directory tree), `tar://` (local archive), and
//! `http(s)://` (downloaded into the staging directory before extraction).

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};
use tokio_util::sync::CancellationToken;

const DOWNLOAD_CHUNK: usize = 64 * 1024;

/// Supported archive source protocols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveSource {
    /// Local directory copied verbatim (`file:///path/to/rootfs`).
    Directory(PathBuf),
    /// Local tar archive (`tar:///path/to/rootfs.tar.gz`).
    Tarball(PathBuf),
    /// Remote HTTP(S) archive.
    Remote {
        /// URL of the archive.
        url: String,
    },
}

/// Resolves an archive URI into an [`ArchiveSource`].
///
/// # Errors
///
/// Returns an error if the URI scheme is unsupported or a local path is
/// missing.
pub fn resolve_source(uri: &str) -> Result<ArchiveSource> {
    if let Some(path_str) = uri.strip_prefix("file://") {
        let path = PathBuf::from(path_str);
        if !path.is_dir() {
            return Err(BurrowError::NotFound {
                kind: "root tree directory",
                id: path_str.to_string(),
            });
        }
        tracing::debug!(path = %path.display(), "resolved file:// source");
        Ok(ArchiveSource::Directory(path))
    } else if let Some(path_str) = uri.strip_prefix("tar://") {
        let path = PathBuf::from(path_str);
        if !path.is_file() {
            return Err(BurrowError::NotFound {
                kind: "root tree archive",
                id: path_str.to_string(),
            });
        }
        tracing::debug!(path = %path.display(), "resolved tar:// source");
        Ok(ArchiveSource::Tarball(path))
    } else if uri.starts_with("https://") || uri.starts_with("http://") {
        tracing::debug!(url = uri, "resolved remote source");
        Ok(ArchiveSource::Remote {
            url: uri.to_string(),
        })
    } else {
        Err(BurrowError::Config {
            message: format!("unsupported archive URI scheme: {uri}"),
        })
    }
}

/// File name to store a remote archive under, keeping its compression
/// suffix so extraction can detect it.
#[must_use]
pub fn download_file_name(url: &str) -> String {
    let last = url.rsplit('/').next().unwrap_or_default();
    let last = last.split(['?', '#']).next().unwrap_or_default();
    if last.is_empty() {
        "archive.tar".into()
    } else {
        last.to_string()
    }
}

/// Downloads `url` into `target`, checking `cancel` between chunks.
///
/// Blocking; call from a blocking task.
///
/// # Errors
///
/// Returns an error on HTTP failure, a non-success status, a write error,
/// or cancellation.
pub fn download(url: &str, target: &Path, cancel: &CancellationToken) -> Result<u64> {
    tracing::info!(url, target = %target.display(), "downloading archive");
    let fail = |reason: String| BurrowError::Config {
        message: format!("download of {url} failed: {reason}"),
    };
    let mut response = reqwest::blocking::get(url).map_err(|e| fail(e.to_string()))?;
    if !response.status().is_success() {
        return Err(fail(format!("HTTP {}", response.status())));
    }
    let mut file = std::fs::File::create(target).map_err(|e| BurrowError::io(target, e))?;
    let mut buf = vec![0_u8; DOWNLOAD_CHUNK];
    let mut total = 0_u64;
    loop {
        if cancel.is_cancelled() {
            return Err(BurrowError::Cancelled {
                operation: format!("download of {url}"),
            });
        }
        let n = response.read(&mut buf).map_err(|e| fail(e.to_string()))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .map_err(|e| BurrowError::io(target, e))?;
        total += n as u64;
    }
    file.sync_all().map_err(|e| BurrowError::io(target, e))?;
    tracing::info!(url, bytes = total, "download complete");
    Ok(total)
}
