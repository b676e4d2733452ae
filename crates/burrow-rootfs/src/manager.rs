//! Root-filesystem manager.
//!
//! Owns the distribution catalog and every staged environment, and is the
//! only component that starts the launcher.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use burrow_common::config::BurrowConfig;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{Distribution, EnvironmentStatus, validate_name};
use burrow_core::launcher::{LauncherCommand, resolve_launcher};
use burrow_core::{ExecOutput, OutputTarget, ProcessHandle, StdinMode, Supervisor};
use tokio_util::sync::CancellationToken;

use crate::catalog::DistributionCatalog;
use crate::environment::{Environment, read_metadata, write_metadata};
use crate::staging::{StagingRequest, stage};
use crate::storage::{STAGING_PREFIX, StorageLayout, remove_tree};

/// Environment variable pointing the launcher at its scratch directory.
const LAUNCHER_TMP_VAR: &str = "PROOT_TMP_DIR";

/// How to start a long-lived process inside an environment.
#[derive(Debug, Clone, Default)]
pub struct EntrySpec {
    /// Guest argv. Empty runs the default shell.
    pub argv: Vec<String>,
    /// Extra guest environment variables.
    pub env: Vec<(String, String)>,
    /// Guest working directory, `/` when unset.
    pub working_dir: Option<String>,
    /// Additional `(host, guest)` binds.
    pub binds: Vec<(String, String)>,
    /// File receiving stdout and stderr. Discarded when unset.
    pub log_file: Option<PathBuf>,
}

/// Manages distributions and staged environments.
pub struct RootfsManager {
    layout: StorageLayout,
    catalog: DistributionCatalog,
    supervisor: Supervisor,
    launcher: PathBuf,
    launcher_env: BTreeMap<String, String>,
    min_free_bytes: u64,
    environments: Mutex<BTreeMap<String, Environment>>,
    entered: Mutex<HashMap<String, Vec<Weak<ProcessHandle>>>>,
}

impl std::fmt::Debug for RootfsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootfsManager")
            .field("root", &self.layout.root())
            .field("launcher", &self.launcher)
            .finish_non_exhaustive()
    }
}

/// Removes a staging placeholder and cancels the staging task unless
/// disarmed.
struct PendingEnvironment<'a> {
    environments: &'a Mutex<BTreeMap<String, Environment>>,
    name: &'a str,
    cancel: CancellationToken,
    armed: bool,
}

impl Drop for PendingEnvironment<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cancel.cancel();
            let _ = lock(self.environments).remove(self.name);
        }
    }
}

impl RootfsManager {
    /// Opens the store under `config.data_dir` and recovers its state.
    ///
    /// Leftover staging directories are deleted. Environments whose
    /// staging never finished, or whose record or tree is missing, are
    /// kept in the `Error` status for the operator to destroy.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be created or listed.
    pub fn open(config: &BurrowConfig, supervisor: Supervisor) -> Result<Self> {
        let layout = StorageLayout::open(&config.data_dir)?;
        let environments = recover(&layout)?;
        tracing::info!(
            root = %layout.root().display(),
            environments = environments.len(),
            "root-filesystem manager opened"
        );
        Ok(Self {
            catalog: DistributionCatalog::open(layout.root()),
            layout,
            supervisor,
            launcher: config.launcher.clone(),
            launcher_env: config.launcher_env.clone(),
            min_free_bytes: config.min_free_bytes,
            environments: Mutex::new(environments),
            entered: Mutex::new(HashMap::new()),
        })
    }

    /// Storage layout backing this manager.
    #[must_use]
    pub const fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Lists bundled and registered distributions.
    ///
    /// # Errors
    ///
    /// Returns an error if the registered catalog cannot be read.
    pub fn list_distributions(&self) -> Result<Vec<Distribution>> {
        self.catalog.list()
    }

    /// Adds a distribution to the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::DuplicateName`] if the name is taken.
    pub fn register_distribution(&self, distribution: Distribution) -> Result<()> {
        self.catalog.register(distribution)
    }

    /// Removes a registered distribution. Environments already staged from
    /// it are kept.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] for bundled or unknown entries.
    pub fn remove_distribution(&self, name: &str) -> Result<()> {
        self.catalog.remove(name)
    }

    /// Snapshot of all known environments, sorted by name.
    #[must_use]
    pub fn list_environments(&self) -> Vec<Environment> {
        lock(&self.environments).values().cloned().collect()
    }

    /// Looks an environment up by name.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] if no environment has that name.
    pub fn environment(&self, name: &str) -> Result<Environment> {
        lock(&self.environments)
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    /// Status of the environment called `name`, `Unstaged` if nothing has
    /// been staged under that name.
    #[must_use]
    pub fn environment_status(&self, name: &str) -> EnvironmentStatus {
        lock(&self.environments)
            .get(name)
            .map_or(EnvironmentStatus::Unstaged, |e| e.status)
    }

    /// Stages `distribution` as a new environment called `name`.
    ///
    /// The name is reserved for the duration of staging. Dropping the
    /// returned future or firing `cancel` aborts the copy and rolls the
    /// staging directory back.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::DuplicateName`] if the name is staged or
    /// being staged, [`BurrowError::NotFound`] for an unknown distribution,
    /// and [`BurrowError::Staging`] for every failure once staging began.
    pub async fn create_environment(
        &self,
        distribution: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Environment> {
        validate_name("environment", name)?;
        let distribution = self.catalog.get(distribution)?;
        {
            let mut environments = lock(&self.environments);
            if environments.contains_key(name) || self.layout.has_environment(name) {
                return Err(BurrowError::DuplicateName {
                    kind: "environment",
                    name: name.to_string(),
                });
            }
            let _ = environments.insert(
                name.to_string(),
                Environment::staging(name, &distribution.name, self.layout.rootfs_path(name)),
            );
        }
        let mut pending = PendingEnvironment {
            environments: &self.environments,
            name,
            cancel: cancel.child_token(),
            armed: true,
        };

        let layout = self.layout.clone();
        let owned_name = name.to_string();
        let min_free_bytes = self.min_free_bytes;
        let token = pending.cancel.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let request = StagingRequest {
                layout: &layout,
                name: &owned_name,
                distribution: &distribution,
                min_free_bytes,
            };
            stage(&request, &token)
        })
        .await;

        let staged = match joined {
            Ok(result) => result,
            Err(e) => Err(BurrowError::Staging {
                name: name.to_string(),
                reason: format!("staging task failed: {e}"),
            }),
        };
        match staged {
            Ok(environment) => {
                pending.armed = false;
                let _ = lock(&self.environments).insert(name.to_string(), environment.clone());
                Ok(environment)
            }
            Err(e @ BurrowError::Staging { .. }) => Err(e),
            Err(e) => Err(BurrowError::Staging {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Starts a long-lived process rooted in the environment.
    ///
    /// The process gets a piped stdin so the default shell stays alive
    /// until terminated.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] for an unknown environment and
    /// [`BurrowError::Launch`] if the environment is not ready, the root
    /// tree or launcher is missing, or the spawn fails.
    pub fn enter_environment(&self, name: &str, entry: EntrySpec) -> Result<Arc<ProcessHandle>> {
        let environment = self.environment(name)?;
        let mut command = self
            .launcher_command(&environment)?
            .argv(entry.argv)
            .working_dir(entry.working_dir.unwrap_or_else(|| "/".into()));
        for (host, guest) in entry.binds {
            command = command.bind(host, guest);
        }
        for (key, value) in entry.env {
            command = command.env(key, value);
        }
        let output = entry.log_file.map_or(OutputTarget::Null, OutputTarget::File);
        let spec = command.into_spec(StdinMode::Piped, output);

        let handle = self
            .supervisor
            .spawn(&spec)
            .map_err(|e| launch_error(name, &e))?;
        let mut entered = lock(&self.entered);
        let holders = entered.entry(name.to_string()).or_default();
        holders.retain(|w| w.upgrade().is_some_and(|h| h.is_alive()));
        holders.push(Arc::downgrade(&handle));
        tracing::info!(environment = name, pid = handle.pid(), "entered environment");
        Ok(handle)
    }

    /// Runs `/bin/sh -c <command>` inside the environment to completion.
    ///
    /// A non-zero exit code is returned as a normal result.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Launch`] if the launcher cannot be started
    /// and [`BurrowError::Cancelled`] if `cancel` fires first.
    pub async fn execute_in_environment(
        &self,
        name: &str,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput> {
        let environment = self.environment(name)?;
        let spec = self
            .launcher_command(&environment)?
            .shell_command(command)
            .into_spec(StdinMode::Null, OutputTarget::Null);
        tracing::debug!(environment = name, command, "executing in environment");
        match self.supervisor.run(&spec, cancel).await {
            Ok(output) => Ok(output),
            Err(e @ BurrowError::Spawn { .. }) => Err(launch_error(name, &e)),
            Err(e) => Err(e),
        }
    }

    /// Number of live processes entered into the environment.
    #[must_use]
    pub fn live_entries(&self, name: &str) -> usize {
        let mut entered = lock(&self.entered);
        let Some(holders) = entered.get_mut(name) else {
            return 0;
        };
        holders.retain(|w| w.upgrade().is_some_and(|h| h.is_alive()));
        holders.len()
    }

    /// Deletes the environment's tree and forgets it.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] for an unknown environment,
    /// [`BurrowError::InUse`] while it is being staged or a process
    /// entered into it is still alive.
    pub fn destroy_environment(&self, name: &str) -> Result<()> {
        let mut environments = lock(&self.environments);
        let Some(environment) = environments.get(name) else {
            return Err(not_found(name));
        };
        if environment.status == EnvironmentStatus::Staging {
            return Err(BurrowError::InUse {
                environment: name.to_string(),
                holder: "an in-flight staging operation".into(),
            });
        }
        let live = self.live_entries(name);
        if live > 0 {
            return Err(BurrowError::InUse {
                environment: name.to_string(),
                holder: format!("{live} live process(es)"),
            });
        }
        remove_tree(&self.layout.environment_dir(name))?;
        let _ = environments.remove(name);
        let _ = lock(&self.entered).remove(name);
        tracing::info!(environment = name, "environment destroyed");
        Ok(())
    }

    fn launcher_command(&self, environment: &Environment) -> Result<LauncherCommand> {
        let name = &environment.name;
        if !environment.is_ready() {
            return Err(BurrowError::Launch {
                environment: name.clone(),
                reason: format!("environment status is {}", environment.status),
            });
        }
        if !environment.root_path.is_dir() {
            return Err(BurrowError::Launch {
                environment: name.clone(),
                reason: format!("root tree {} is missing", environment.root_path.display()),
            });
        }
        let launcher = resolve_launcher(&self.launcher).ok_or_else(|| BurrowError::Launch {
            environment: name.clone(),
            reason: format!("launcher {} not found", self.launcher.display()),
        })?;
        let mut command = LauncherCommand::new(launcher, &environment.root_path)
            .launcher_env(LAUNCHER_TMP_VAR, self.layout.tmp_dir().display().to_string());
        for (key, value) in &self.launcher_env {
            command = command.launcher_env(key, value);
        }
        Ok(command)
    }
}

fn recover(layout: &StorageLayout) -> Result<BTreeMap<String, Environment>> {
    let dir = layout.environments_dir();
    let mut environments = BTreeMap::new();
    for entry in std::fs::read_dir(&dir).map_err(|e| BurrowError::io(&dir, e))? {
        let entry = entry.map_err(|e| BurrowError::io(&dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(STAGING_PREFIX) {
            tracing::warn!(path = %entry.path().display(), "removing interrupted staging directory");
            remove_tree(&entry.path())?;
            continue;
        }
        if !entry.file_type().is_ok_and(|t| t.is_dir()) {
            continue;
        }
        let metadata = layout.metadata_path(&name);
        let mut environment = match read_metadata(&metadata) {
            Ok(environment) => environment,
            Err(e) => {
                let mut environment =
                    Environment::staging(&name, "unknown", layout.rootfs_path(&name));
                environment.mark_error(format!("unreadable metadata: {e}"));
                environment
            }
        };
        let reason = match environment.status {
            EnvironmentStatus::Staging => Some("staging was interrupted".to_string()),
            EnvironmentStatus::Ready if !environment.root_path.is_dir() => {
                Some("root tree is missing".to_string())
            }
            _ => None,
        };
        if let Some(reason) = reason {
            environment.mark_error(reason);
        }
        if environment.status == EnvironmentStatus::Error {
            tracing::warn!(environment = %name, reason = ?environment.last_error, "environment needs operator cleanup");
            write_metadata(&metadata, &environment)?;
        }
        let _ = environments.insert(name, environment);
    }
    Ok(environments)
}

fn not_found(name: &str) -> BurrowError {
    BurrowError::NotFound {
        kind: "environment",
        id: name.to_string(),
    }
}

fn launch_error(name: &str, cause: &BurrowError) -> BurrowError {
    BurrowError::Launch {
        environment: name.to_string(),
        reason: cause.to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
