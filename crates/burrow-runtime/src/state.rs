//! Persistent container state.
//!
//! Each container owns `<data>/containers/<name>/` with the `app`, `data`,
//! `logs`, and `tmp` subdirectories and a `container.json` record written
//! atomically on every transition, so the engine needs no daemon to
//! remember what it created.

use std::path::{Path, PathBuf};

use burrow_common::constants::{CONTAINER_METADATA_FILE, CONTAINER_SUBDIRS, CONTAINERS_DIR};
use burrow_common::error::{BurrowError, Result};
use burrow_rootfs::storage::{remove_tree, write_atomic};

use crate::container::Container;

/// Directory store for container trees and records.
#[derive(Debug, Clone)]
pub struct ContainerStore {
    root: PathBuf,
}

impl ContainerStore {
    /// Opens the store under `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the containers directory cannot be created.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let root = data_dir.join(CONTAINERS_DIR);
        std::fs::create_dir_all(&root).map_err(|e| BurrowError::io(&root, e))?;
        Ok(Self { root })
    }

    /// Private directory of a container.
    #[must_use]
    pub fn container_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Record file of a container.
    #[must_use]
    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.container_dir(name).join(CONTAINER_METADATA_FILE)
    }

    /// Creates the container's private tree.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn create_tree(&self, name: &str) -> Result<PathBuf> {
        let dir = self.container_dir(name);
        for sub in CONTAINER_SUBDIRS {
            let path = dir.join(sub);
            std::fs::create_dir_all(&path).map_err(|e| BurrowError::io(&path, e))?;
        }
        Ok(dir)
    }

    /// Writes the container's record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written.
    pub fn save(&self, container: &Container) -> Result<()> {
        let json = serde_json::to_string_pretty(container)?;
        write_atomic(&self.metadata_path(&container.name), json.as_bytes())
    }

    /// Loads every readable record. Unreadable ones are skipped with a
    /// warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the store directory cannot be listed.
    pub fn load_all(&self) -> Result<Vec<Container>> {
        tracing::debug!(path = %self.root.display(), "loading container records");
        let mut containers = Vec::new();
        for entry in std::fs::read_dir(&self.root).map_err(|e| BurrowError::io(&self.root, e))? {
            let entry = entry.map_err(|e| BurrowError::io(&self.root, e))?;
            let path = entry.path().join(CONTAINER_METADATA_FILE);
            if !path.is_file() {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| BurrowError::io(&path, e))
                .and_then(|content| Ok(serde_json::from_str::<Container>(&content)?));
            match parsed {
                Ok(container) => containers.push(container),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable container record"),
            }
        }
        Ok(containers)
    }

    /// Deletes the container's tree and record.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be removed.
    pub fn remove(&self, name: &str) -> Result<()> {
        remove_tree(&self.container_dir(name))
    }
}
