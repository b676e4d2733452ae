//! Distribution catalog.
//!
//! The catalog is the bundled list of known distributions plus any
//! operator-registered entries persisted in `distributions.json`.

use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{Distribution, validate_name};

/// Catalog file name inside the data directory.
pub const CATALOG_FILE: &str = "distributions.json";

/// Maps the host architecture onto the naming used by Alpine releases.
fn alpine_arch() -> &'static str {
    match std::env::consts::ARCH {
        "aarch64" => "aarch64",
        "arm" => "armv7",
        "x86" => "x86",
        _ => "x86_64",
    }
}

/// Maps the host architecture onto the naming used by Ubuntu base images.
fn ubuntu_arch() -> &'static str {
    match std::env::consts::ARCH {
        "aarch64" => "arm64",
        "arm" => "armhf",
        _ => "amd64",
    }
}

/// Distributions shipped with the runtime.
#[must_use]
pub fn bundled() -> Vec<Distribution> {
    let alpine = alpine_arch();
    let ubuntu = ubuntu_arch();
    vec![
        Distribution {
            name: "alpine".into(),
            display_name: "Alpine Linux 3.20".into(),
            package_manager: "apk".into(),
            archive: format!(
                "https://dl-cdn.alpinelinux.org/alpine/v3.20/releases/{alpine}/alpine-minirootfs-3.20.3-{alpine}.tar.gz"
            ),
            sha256: None,
        },
        Distribution {
            name: "ubuntu".into(),
            display_name: "Ubuntu 24.04 LTS (base)".into(),
            package_manager: "apt".into(),
            archive: format!(
                "https://cdimage.ubuntu.com/ubuntu-base/releases/24.04/release/ubuntu-base-24.04.1-base-{ubuntu}.tar.gz"
            ),
            sha256: None,
        },
    ]
}

/// Catalog of bundled and registered distributions.
#[derive(Debug)]
pub struct DistributionCatalog {
    catalog_path: PathBuf,
}

impl DistributionCatalog {
    /// Opens the catalog stored in `data_dir`.
    #[must_use]
    pub fn open(data_dir: &Path) -> Self {
        Self {
            catalog_path: data_dir.join(CATALOG_FILE),
        }
    }

    /// Lists bundled entries followed by registered ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog file exists but cannot be parsed.
    pub fn list(&self) -> Result<Vec<Distribution>> {
        let mut all = bundled();
        all.extend(self.registered()?);
        Ok(all)
    }

    /// Looks a distribution up by name.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] if no entry has that name.
    pub fn get(&self, name: &str) -> Result<Distribution> {
        self.list()?
            .into_iter()
            .find(|d| d.name == name)
            .ok_or_else(|| BurrowError::NotFound {
                kind: "distribution",
                id: name.to_string(),
            })
    }

    /// Registers an operator-provided distribution.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::DuplicateName`] if the name is taken, or an
    /// error if the catalog cannot be written.
    pub fn register(&self, distribution: Distribution) -> Result<()> {
        validate_name("distribution", &distribution.name)?;
        if self.list()?.iter().any(|d| d.name == distribution.name) {
            return Err(BurrowError::DuplicateName {
                kind: "distribution",
                name: distribution.name,
            });
        }
        let _ = crate::source::resolve_source(&distribution.archive)?;
        let mut entries = self.registered()?;
        tracing::info!(name = %distribution.name, archive = %distribution.archive, "registering distribution");
        entries.push(distribution);
        self.write_entries(&entries)
    }

    /// Removes a registered distribution. Bundled entries cannot be removed.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] if no registered entry has that name.
    pub fn remove(&self, name: &str) -> Result<()> {
        let mut entries = self.registered()?;
        let before = entries.len();
        entries.retain(|d| d.name != name);
        if entries.len() == before {
            return Err(BurrowError::NotFound {
                kind: "registered distribution",
                id: name.to_string(),
            });
        }
        self.write_entries(&entries)
    }

    fn registered(&self) -> Result<Vec<Distribution>> {
        if !self.catalog_path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.catalog_path)
            .map_err(|e| BurrowError::io(&self.catalog_path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_entries(&self, entries: &[Distribution]) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        crate::storage::write_atomic(&self.catalog_path, json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(name: &str, dir: &Path) -> Distribution {
        Distribution {
            name: name.into(),
            display_name: name.into(),
            package_manager: "apk".into(),
            archive: format!("file://{}", dir.display()),
            sha256: None,
        }
    }

    #[test]
    fn bundled_entries_are_listed_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let catalog = DistributionCatalog::open(dir.path());
        let names: Vec<_> = catalog.list().expect("list").into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["alpine", "ubuntu"]);
    }

    #[test]
    fn register_persists_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let catalog = DistributionCatalog::open(dir.path());
        catalog.register(local("alpine-mini", dir.path())).expect("register");

        let reopened = DistributionCatalog::open(dir.path());
        let entry = reopened.get("alpine-mini").expect("get");
        assert_eq!(entry.package_manager, "apk");
    }

    #[test]
    fn register_duplicate_of_bundled_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let catalog = DistributionCatalog::open(dir.path());
        let err = catalog.register(local("alpine", dir.path())).unwrap_err();
        assert!(matches!(err, BurrowError::DuplicateName { .. }));
    }

    #[test]
    fn register_rejects_missing_archive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let catalog = DistributionCatalog::open(dir.path());
        let entry = local("ghost", &dir.path().join("missing"));
        assert!(catalog.register(entry).is_err());
        assert!(catalog.get("ghost").is_err());
    }

    #[test]
    fn remove_registered_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let catalog = DistributionCatalog::open(dir.path());
        catalog.register(local("mine", dir.path())).expect("register");
        catalog.remove("mine").expect("remove");
        assert!(catalog.get("mine").is_err());
        assert!(catalog.remove("alpine").is_err());
    }
}
