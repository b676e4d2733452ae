//! Container console logs and the append-only audit log.

use std::io::Write;
use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};

/// Console log of a container's main process.
#[must_use]
pub fn console_log_path(container_dir: &Path) -> PathBuf {
    container_dir.join("logs").join("console.log")
}

/// Reads a log file.
///
/// Returns an empty string if the file does not exist yet.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_logs(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    std::fs::read_to_string(path).map_err(|e| BurrowError::io(path, e))
}

/// Appends one line to a log file.
///
/// Creates the parent directory and file if they do not exist.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created or written.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BurrowError::io(parent, e))?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| BurrowError::io(path, e))?;
    writeln!(file, "{line}").map_err(|e| BurrowError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_log_lives_in_logs_subdir() {
        let p = console_log_path(Path::new("/data/containers/web"));
        assert_eq!(p, PathBuf::from("/data/containers/web/logs/console.log"));
    }

    #[test]
    fn read_logs_missing_file_returns_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let content = read_logs(&dir.path().join("nope.log")).expect("should succeed");
        assert!(content.is_empty());
    }

    #[test]
    fn append_creates_directory_and_keeps_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs").join("audit.jsonl");
        append_line(&path, "line one").expect("append 1");
        append_line(&path, "line two").expect("append 2");

        let content = read_logs(&path).expect("read");
        assert_eq!(content, "line one\nline two\n");
    }
}
