//! On-disk layout of staged environments.
//!
//! ```text
//! <data>/environments/<name>/rootfs/            root tree
//! <data>/environments/<name>/environment.json   metadata record
//! <data>/environments/.staging-<name>-<uuid>/   in-flight staging
//! <data>/tmp/                                   launcher scratch space
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use burrow_common::constants::{ENVIRONMENT_METADATA_FILE, ENVIRONMENTS_DIR};
use burrow_common::error::{BurrowError, Result};

/// Prefix of in-flight staging directories.
pub const STAGING_PREFIX: &str = ".staging-";

/// Resolves paths of the environment store.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Root directory for all stored data.
    root: PathBuf,
}

impl StorageLayout {
    /// Opens or initializes the layout at the given root.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let layout = Self { root: root.into() };
        for dir in [layout.environments_dir(), layout.tmp_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| BurrowError::io(&dir, e))?;
        }
        tracing::debug!(path = %layout.root.display(), "opened environment storage");
        Ok(layout)
    }

    /// Returns the root storage path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all environments.
    #[must_use]
    pub fn environments_dir(&self) -> PathBuf {
        self.root.join(ENVIRONMENTS_DIR)
    }

    /// Scratch directory handed to the launcher.
    #[must_use]
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Directory of a staged environment.
    #[must_use]
    pub fn environment_dir(&self, name: &str) -> PathBuf {
        self.environments_dir().join(name)
    }

    /// Root tree of a staged environment.
    #[must_use]
    pub fn rootfs_path(&self, name: &str) -> PathBuf {
        self.environment_dir(name).join("rootfs")
    }

    /// Metadata record of a staged environment.
    #[must_use]
    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.environment_dir(name).join(ENVIRONMENT_METADATA_FILE)
    }

    /// A fresh, unique staging directory path for `name`.
    #[must_use]
    pub fn new_staging_dir(&self, name: &str) -> PathBuf {
        self.environments_dir()
            .join(format!("{STAGING_PREFIX}{name}-{}", uuid::Uuid::new_v4()))
    }

    /// Checks whether an environment directory exists on disk.
    #[must_use]
    pub fn has_environment(&self, name: &str) -> bool {
        self.environment_dir(name).exists()
    }

    /// Free bytes on the filesystem holding the environments.
    ///
    /// # Errors
    ///
    /// Returns an error if `statvfs` fails.
    #[allow(clippy::useless_conversion)]
    pub fn available_bytes(&self) -> Result<u64> {
        let dir = self.environments_dir();
        let stat = nix::sys::statvfs::statvfs(&dir)
            .map_err(|e| BurrowError::io(&dir, std::io::Error::from(e)))?;
        Ok(u64::from(stat.blocks_available()).saturating_mul(u64::from(stat.fragment_size())))
    }
}

/// Writes `bytes` to `path` via a temporary sibling and a rename.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be written or renamed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| BurrowError::io(parent, e))?;
    let file_name = path
        .file_name()
        .map_or_else(|| "record".into(), |n| n.to_string_lossy().into_owned());
    let tmp = parent.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));
    let result = (|| {
        let mut file = std::fs::File::create(&tmp).map_err(|e| BurrowError::io(&tmp, e))?;
        file.write_all(bytes).map_err(|e| BurrowError::io(&tmp, e))?;
        file.sync_all().map_err(|e| BurrowError::io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| BurrowError::io(path, e))
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// Recursively deletes a tree, granting the owner write permission on
/// read-only directories when the first attempt is refused.
///
/// # Errors
///
/// Returns an error if the tree still cannot be removed.
pub fn remove_tree(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            tracing::debug!(path = %path.display(), "making tree writable before removal");
            make_owner_writable(path)?;
            std::fs::remove_dir_all(path).map_err(|e| BurrowError::io(path, e))
        }
        Err(e) => Err(BurrowError::io(path, e)),
    }
}

fn make_owner_writable(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let meta = std::fs::symlink_metadata(dir).map_err(|e| BurrowError::io(dir, e))?;
    if !meta.is_dir() {
        return Ok(());
    }
    let mut perms = meta.permissions();
    perms.set_mode(perms.mode() | 0o700);
    std::fs::set_permissions(dir, perms).map_err(|e| BurrowError::io(dir, e))?;
    for entry in std::fs::read_dir(dir).map_err(|e| BurrowError::io(dir, e))? {
        let entry = entry.map_err(|e| BurrowError::io(dir, e))?;
        if entry.file_type().is_ok_and(|t| t.is_dir()) {
            make_owner_writable(&entry.path())?;
        }
    }
    Ok(())
}
