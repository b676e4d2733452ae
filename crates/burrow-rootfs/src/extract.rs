//! Root tree extraction and copying.
//!
//! Both operations check the cancellation token between entries and leave
//! cleanup of a partial target to the caller, which owns the staging
//! directory.

use std::io::Read;
use std::path::Path;

use burrow_common::error::{BurrowError, Result};
use tokio_util::sync::CancellationToken;

/// Rough expansion ratio of a gzip-compressed root tree.
const GZIP_EXPANSION: u64 = 3;

fn cancelled(what: &Path) -> BurrowError {
    BurrowError::Cancelled {
        operation: format!("staging from {}", what.display()),
    }
}

/// Determines whether the archive is gzip-compressed based on extension.
fn is_gzip_archive(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz") || ext.eq_ignore_ascii_case("tgz"))
}

/// Estimates the bytes an archive occupies once unpacked.
///
/// # Errors
///
/// Returns an error if the archive metadata cannot be read.
pub fn estimated_unpacked_size(archive: &Path) -> Result<u64> {
    let len = std::fs::metadata(archive)
        .map_err(|e| BurrowError::io(archive, e))?
        .len();
    Ok(if is_gzip_archive(archive) {
        len.saturating_mul(GZIP_EXPANSION)
    } else {
        len
    })
}

/// Extracts a tar archive into `target`.
///
/// Supports plain `.tar` and gzip-compressed `.tar.gz` / `.tgz` archives.
/// Permissions are preserved; ownership is not (the launcher fakes it).
/// Returns the number of entries unpacked.
///
/// # Errors
///
/// Returns an error if the archive is corrupt, an entry escapes the
/// target, or `cancel` fires.
pub fn extract_archive(archive: &Path, target: &Path, cancel: &CancellationToken) -> Result<u64> {
    tracing::info!(
        archive = %archive.display(),
        target = %target.display(),
        "extracting root tree"
    );
    std::fs::create_dir_all(target).map_err(|e| BurrowError::io(target, e))?;
    let file = std::fs::File::open(archive).map_err(|e| BurrowError::io(archive, e))?;
    let count = if is_gzip_archive(archive) {
        unpack_entries(flate2::read::GzDecoder::new(file), archive, target, cancel)?
    } else {
        unpack_entries(file, archive, target, cancel)?
    };
    tracing::info!(entries = count, "root tree extracted");
    Ok(count)
}

fn unpack_entries<R: Read>(
    reader: R,
    archive_path: &Path,
    target: &Path,
    cancel: &CancellationToken,
) -> Result<u64> {
    let corrupt = |e: std::io::Error| BurrowError::Config {
        message: format!("corrupt archive {}: {e}", archive_path.display()),
    };
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_unpack_xattrs(false);

    let mut count = 0_u64;
    for entry in archive.entries().map_err(corrupt)? {
        if cancel.is_cancelled() {
            return Err(cancelled(archive_path));
        }
        let mut entry = entry.map_err(corrupt)?;
        let kind = entry.header().entry_type();
        if kind.is_block_special() || kind.is_character_special() || kind.is_fifo() {
            // Device nodes cannot be created without privileges; the
            // launcher binds the host /dev instead.
            continue;
        }
        let unpacked = entry.unpack_in(target).map_err(corrupt)?;
        if !unpacked {
            return Err(BurrowError::Config {
                message: format!(
                    "archive {} contains an entry outside the root tree",
                    archive_path.display()
                ),
            });
        }
        count += 1;
    }
    Ok(count)
}

/// Total size in bytes of the regular files under `path`.
///
/// # Errors
///
/// Returns an error if a directory cannot be listed.
pub fn tree_size(path: &Path) -> Result<u64> {
    let mut total = 0_u64;
    for entry in std::fs::read_dir(path).map_err(|e| BurrowError::io(path, e))? {
        let entry = entry.map_err(|e| BurrowError::io(path, e))?;
        let file_type = entry.file_type().map_err(|e| BurrowError::io(entry.path(), e))?;
        if file_type.is_dir() {
            total += tree_size(&entry.path())?;
        } else if file_type.is_file() {
            total += entry
                .metadata()
                .map_err(|e| BurrowError::io(entry.path(), e))?
                .len();
        }
    }
    Ok(total)
}

/// Copies the directory tree at `src` into `dst`, preserving symlinks and
/// permission bits. Returns the number of entries copied.
///
/// # Errors
///
/// Returns an error on any I/O failure or when `cancel` fires.
pub fn copy_tree(src: &Path, dst: &Path, cancel: &CancellationToken) -> Result<u64> {
    tracing::info!(src = %src.display(), dst = %dst.display(), "copying root tree");
    std::fs::create_dir_all(dst).map_err(|e| BurrowError::io(dst, e))?;
    let count = copy_dir_contents(src, dst, cancel)?;
    let perms = std::fs::metadata(src)
        .map_err(|e| BurrowError::io(src, e))?
        .permissions();
    std::fs::set_permissions(dst, perms).map_err(|e| BurrowError::io(dst, e))?;
    tracing::info!(entries = count, "root tree copied");
    Ok(count)
}

fn copy_dir_contents(src: &Path, dst: &Path, cancel: &CancellationToken) -> Result<u64> {
    let mut count = 0_u64;
    for entry in std::fs::read_dir(src).map_err(|e| BurrowError::io(src, e))? {
        if cancel.is_cancelled() {
            return Err(cancelled(src));
        }
        let entry = entry.map_err(|e| BurrowError::io(src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| BurrowError::io(&from, e))?;
        if file_type.is_symlink() {
            let link = std::fs::read_link(&from).map_err(|e| BurrowError::io(&from, e))?;
            std::os::unix::fs::symlink(&link, &to).map_err(|e| BurrowError::io(&to, e))?;
        } else if file_type.is_dir() {
            std::fs::create_dir(&to).map_err(|e| BurrowError::io(&to, e))?;
            count += copy_dir_contents(&from, &to, cancel)?;
            // Directory permissions last, so read-only dirs can be filled.
            let perms = entry
                .metadata()
                .map_err(|e| BurrowError::io(&from, e))?
                .permissions();
            std::fs::set_permissions(&to, perms).map_err(|e| BurrowError::io(&to, e))?;
        } else if file_type.is_file() {
            let _ = std::fs::copy(&from, &to).map_err(|e| BurrowError::io(&from, e))?;
        } else {
            tracing::debug!(path = %from.display(), "skipping special file");
            continue;
        }
        count += 1;
    }
    Ok(count)
}
