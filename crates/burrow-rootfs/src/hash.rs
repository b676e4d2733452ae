//! SHA-256 content verification for distribution archives.

use std::fmt::Write as _;
use std::io::Read;
use std::path::Path;

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::Sha256Hash;
use sha2::{Digest, Sha256};

/// Computes the SHA-256 hash of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn hash_file(path: &Path) -> Result<Sha256Hash> {
    tracing::debug!(path = %path.display(), "computing SHA-256 hash");
    let mut file = std::fs::File::open(path).map_err(|e| BurrowError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0_u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| BurrowError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let mut hex = String::with_capacity(64);
    for byte in hasher.finalize() {
        let _ = write!(hex, "{byte:02x}");
    }
    Sha256Hash::from_hex(hex)
}

/// Validates that a file matches the expected SHA-256 hash.
///
/// # Errors
///
/// Returns [`BurrowError::HashMismatch`] if the hashes do not match.
pub fn validate_hash(path: &Path, expected: &Sha256Hash) -> Result<Sha256Hash> {
    let actual = hash_file(path)?;
    if actual != *expected {
        return Err(BurrowError::HashMismatch {
            resource: path.display().to_string(),
            expected: expected.as_hex().to_string(),
            actual: actual.as_hex().to_string(),
        });
    }
    tracing::debug!(path = %path.display(), hash = %actual, "hash verified");
    Ok(actual)
}
