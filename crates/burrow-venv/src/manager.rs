//! Interpreter-environment manager.
//!
//! Environments live under `<data>/venvs/<name>/` and are recorded in
//! `<data>/venvs/registry.json`. Activation is bookkeeping: it never
//! touches the environment of the calling process.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use burrow_common::config::BurrowConfig;
use burrow_common::constants::VENVS_DIR;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::validate_name;
use burrow_core::Supervisor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::toolchain::{PythonToolchain, RuntimeToolchain};

/// Registry file inside the venvs directory.
pub const REGISTRY_FILE: &str = "registry.json";

/// An isolated package set for a language runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterEnvironment {
    /// Unique name.
    pub name: String,
    /// Directory holding the environment.
    pub root_path: PathBuf,
    /// Runtime version it was bootstrapped with.
    pub runtime_version: String,
    /// Whether this is the active environment.
    pub active: bool,
    /// Installed package specifications, in installation order.
    pub packages: Vec<String>,
    /// When the environment was created.
    pub created_at: DateTime<Utc>,
}

/// Creates, activates, and installs into interpreter environments.
pub struct InterpreterManager {
    root: PathBuf,
    toolchain: Arc<dyn RuntimeToolchain>,
    supervisor: Supervisor,
    environments: Mutex<BTreeMap<String, InterpreterEnvironment>>,
    // Serializes mutations that run external commands.
    operations: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for InterpreterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpreterManager")
            .field("root", &self.root)
            .field("toolchain", &self.toolchain)
            .finish_non_exhaustive()
    }
}

impl InterpreterManager {
    /// Opens the manager with the Python toolchain from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read.
    pub fn open(config: &BurrowConfig, supervisor: Supervisor) -> Result<Self> {
        Self::with_toolchain(
            &config.data_dir,
            Arc::new(PythonToolchain::new(config.python.clone())),
            supervisor,
        )
    }

    /// Opens the manager with a custom toolchain.
    ///
    /// Directories under `venvs/` with no registry entry are left over
    /// from an interrupted bootstrap and are deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the registry
    /// cannot be read.
    pub fn with_toolchain(
        data_dir: &Path,
        toolchain: Arc<dyn RuntimeToolchain>,
        supervisor: Supervisor,
    ) -> Result<Self> {
        let root = data_dir.join(VENVS_DIR);
        std::fs::create_dir_all(&root).map_err(|e| BurrowError::io(&root, e))?;
        let environments = load_registry(&root.join(REGISTRY_FILE))?;
        remove_orphans(&root, &environments)?;
        tracing::debug!(root = %root.display(), count = environments.len(), "interpreter registry loaded");
        Ok(Self {
            root,
            toolchain,
            supervisor,
            environments: Mutex::new(environments),
            operations: tokio::sync::Mutex::new(()),
        })
    }

    /// Bootstraps a new environment.
    ///
    /// The environment is registered only once the toolchain's marker
    /// files exist; otherwise its directory is removed.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::DuplicateName`] if the name is taken,
    /// [`BurrowError::Creation`] with the captured output if bootstrapping
    /// fails, and [`BurrowError::Cancelled`] if `cancel` fires first.
    pub async fn create_environment(
        &self,
        name: &str,
        runtime_version: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<InterpreterEnvironment> {
        validate_name("interpreter environment", name)?;
        let _op = self.operations.lock().await;
        let root = self.root.join(name);
        if lock(&self.environments).contains_key(name) || root.exists() {
            return Err(BurrowError::DuplicateName {
                kind: "interpreter environment",
                name: name.to_string(),
            });
        }
        let runtime_version = runtime_version.map_or_else(|| self.toolchain.default_version(), str::to_string);
        let spec = self.toolchain.bootstrap_command(&root, &runtime_version);
        tracing::info!(name, version = %runtime_version, command = %spec, "creating interpreter environment");

        let output = match self.supervisor.run(&spec, cancel).await {
            Ok(output) => output,
            Err(e) => {
                discard(&root);
                return Err(match e {
                    BurrowError::Cancelled { .. } => e,
                    other => BurrowError::Creation {
                        name: name.to_string(),
                        reason: other.to_string(),
                        output: String::new(),
                    },
                });
            }
        };
        if !output.success() {
            discard(&root);
            return Err(BurrowError::Creation {
                name: name.to_string(),
                reason: format!("bootstrap exited with code {}", output.exit_code),
                output: output.combined(),
            });
        }
        if let Some(missing) = self
            .toolchain
            .marker_files(&root)
            .into_iter()
            .find(|marker| !marker.exists())
        {
            discard(&root);
            return Err(BurrowError::Creation {
                name: name.to_string(),
                reason: format!("bootstrap did not produce {}", missing.display()),
                output: output.combined(),
            });
        }

        let environment = InterpreterEnvironment {
            name: name.to_string(),
            root_path: root,
            runtime_version,
            active: false,
            packages: Vec::new(),
            created_at: Utc::now(),
        };
        self.commit(|envs| {
            let _ = envs.insert(name.to_string(), environment.clone());
        })?;
        tracing::info!(name, "interpreter environment created");
        Ok(environment)
    }

    /// Marks `name` as the active environment and deactivates the rest.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] if no environment has that name.
    pub fn activate_environment(&self, name: &str) -> Result<InterpreterEnvironment> {
        let mut activated = None;
        self.commit(|envs| {
            if envs.contains_key(name) {
                for env in envs.values_mut() {
                    env.active = env.name == name;
                }
                activated = envs.get(name).cloned();
            }
        })?;
        let environment = activated.ok_or_else(|| not_found(name))?;
        tracing::info!(name, "interpreter environment activated");
        Ok(environment)
    }

    /// Installs `package` with the environment's package manager.
    ///
    /// The package list changes only when the installer exits with zero.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] for an unknown environment,
    /// [`BurrowError::Install`] with the captured output on a non-zero
    /// exit, and spawn or cancellation errors as they occur.
    pub async fn install_package(
        &self,
        name: &str,
        package: &str,
        cancel: &CancellationToken,
    ) -> Result<InterpreterEnvironment> {
        if package.trim().is_empty() {
            return Err(BurrowError::Config {
                message: "package specification must not be empty".into(),
            });
        }
        let _op = self.operations.lock().await;
        let environment = self.environment(name)?;
        let spec = self.toolchain.install_command(&environment.root_path, package);
        tracing::info!(name, package, "installing package");
        let output = self.supervisor.run(&spec, cancel).await?;
        if !output.success() {
            tracing::warn!(name, package, code = output.exit_code, "package install failed");
            return Err(BurrowError::Install {
                name: name.to_string(),
                package: package.to_string(),
                exit_code: output.exit_code,
                output: output.combined(),
            });
        }

        let mut updated = None;
        self.commit(|envs| {
            if let Some(env) = envs.get_mut(name) {
                env.packages.push(package.to_string());
                updated = Some(env.clone());
            }
        })?;
        updated.ok_or_else(|| not_found(name))
    }

    /// Snapshot of all environments, sorted by name.
    #[must_use]
    pub fn list_environments(&self) -> Vec<InterpreterEnvironment> {
        lock(&self.environments).values().cloned().collect()
    }

    /// Looks an environment up by name.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] if no environment has that name.
    pub fn environment(&self, name: &str) -> Result<InterpreterEnvironment> {
        lock(&self.environments)
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    /// The active environment, if any.
    #[must_use]
    pub fn active(&self) -> Option<InterpreterEnvironment> {
        lock(&self.environments).values().find(|e| e.active).cloned()
    }

    /// Deletes an environment's directory and forgets it.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] for an unknown environment or an
    /// I/O error if the directory cannot be removed.
    pub async fn remove_environment(&self, name: &str) -> Result<()> {
        let _op = self.operations.lock().await;
        let environment = self.environment(name)?;
        match std::fs::remove_dir_all(&environment.root_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(BurrowError::io(&environment.root_path, e)),
        }
        self.commit(|envs| {
            let _ = envs.remove(name);
        })?;
        tracing::info!(name, "interpreter environment removed");
        Ok(())
    }

    /// Applies `change` to the registry and persists it.
    fn commit(&self, change: impl FnOnce(&mut BTreeMap<String, InterpreterEnvironment>)) -> Result<()> {
        let mut environments = lock(&self.environments);
        let mut next = environments.clone();
        change(&mut next);
        save_registry(&self.root.join(REGISTRY_FILE), &next)?;
        *environments = next;
        Ok(())
    }
}

fn load_registry(path: &Path) -> Result<BTreeMap<String, InterpreterEnvironment>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = std::fs::read_to_string(path).map_err(|e| BurrowError::io(path, e))?;
    let list: Vec<InterpreterEnvironment> = serde_json::from_str(&content)?;
    Ok(list.into_iter().map(|e| (e.name.clone(), e)).collect())
}

fn save_registry(path: &Path, environments: &BTreeMap<String, InterpreterEnvironment>) -> Result<()> {
    let list: Vec<&InterpreterEnvironment> = environments.values().collect();
    let json = serde_json::to_string_pretty(&list)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| BurrowError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| BurrowError::io(path, e))
}

fn remove_orphans(root: &Path, environments: &BTreeMap<String, InterpreterEnvironment>) -> Result<()> {
    for entry in std::fs::read_dir(root).map_err(|e| BurrowError::io(root, e))? {
        let entry = entry.map_err(|e| BurrowError::io(root, e))?;
        if !entry.file_type().is_ok_and(|t| t.is_dir()) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if environments.contains_key(&name) {
            continue;
        }
        tracing::warn!(path = %entry.path().display(), "removing unregistered interpreter environment");
        std::fs::remove_dir_all(entry.path()).map_err(|e| BurrowError::io(entry.path(), e))?;
    }
    Ok(())
}

fn discard(root: &Path) {
    match std::fs::remove_dir_all(root) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::error!(path = %root.display(), error = %e, "failed to remove partial environment");
        }
    }
}

fn not_found(name: &str) -> BurrowError {
    BurrowError::NotFound {
        kind: "interpreter environment",
        id: name.to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
