//! Runtime engine that orchestrates container lifecycle.
//!
//! The engine is the only writer of container state. Mutations on one
//! container are serialized through that container's async mutex, which is
//! fair: a `stop` issued while a `start` is in flight waits for the start
//! to settle and then acts on its outcome. Registry reads return cloned
//! snapshots and never wait on a container mutex.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use burrow_common::config::BurrowConfig;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{ContainerConfiguration, ContainerId, ContainerState, validate_name};
use burrow_core::{ExecOutput, ExitNotice, HandleId, ProcessHandle, Supervisor};
use burrow_rootfs::{EntrySpec, RootfsManager};
use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::container::Container;
use crate::events::{EventBus, LifecycleEvent};
use crate::logs::{console_log_path, read_logs};
use crate::metrics::{MetricsSnapshot, collect_metrics};
use crate::state::ContainerStore;

/// Guest paths the container's private directories are bound at.
const PRIVATE_BINDS: [(&str, &str); 3] = [("app", "/app"), ("data", "/data"), ("tmp", "/tmp")];

struct SlotState {
    container: Container,
    handle: Option<Arc<ProcessHandle>>,
    removed: bool,
}

struct Slot {
    state: tokio::sync::Mutex<SlotState>,
}

#[derive(Default)]
struct Registry {
    slots: HashMap<ContainerId, Arc<Slot>>,
    names: HashMap<String, ContainerId>,
    snapshots: BTreeMap<String, Container>,
}

struct Inner {
    config: BurrowConfig,
    supervisor: Supervisor,
    rootfs: RootfsManager,
    store: ContainerStore,
    events: EventBus,
    registry: Mutex<Registry>,
    watches: Mutex<HashMap<HandleId, ContainerId>>,
    // Start holds it shared, environment destruction exclusively.
    environments: tokio::sync::RwLock<()>,
}

/// The runtime engine that coordinates all container operations.
///
/// Cloning is cheap; clones share the same containers.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("data_dir", &self.inner.config.data_dir)
            .field("containers", &lock(&self.inner.registry).snapshots.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Opens the engine over `config.data_dir` and starts the reaper.
    ///
    /// Persisted containers are reloaded. Any recorded as running lost
    /// their process with the previous engine and are moved to `Exited`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the stores cannot be opened or recovered.
    pub fn open(config: BurrowConfig) -> Result<Self> {
        let supervisor = Supervisor::start(config.reaper_interval());
        let rootfs = RootfsManager::open(&config, supervisor.clone())?;
        let store = ContainerStore::open(&config.data_dir)?;
        let events = EventBus::new(&config.data_dir);

        let mut registry = Registry::default();
        for mut container in store.load_all()? {
            if container.state == ContainerState::Running {
                container.transition(ContainerState::Exited)?;
                container.last_error = Some("process did not survive an engine restart".into());
                store.save(&container)?;
                events.publish(LifecycleEvent::for_container(&container, Some(ContainerState::Running)));
            }
            registry.insert(container);
        }
        tracing::info!(
            data_dir = %config.data_dir.display(),
            containers = registry.snapshots.len(),
            "engine opened"
        );

        let inner = Arc::new(Inner {
            config,
            supervisor,
            rootfs,
            store,
            events,
            registry: Mutex::new(registry),
            watches: Mutex::new(HashMap::new()),
            environments: tokio::sync::RwLock::new(()),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        inner.supervisor.on_exit(Arc::new(move |notice: &ExitNotice| {
            let _ = tx.send(*notice);
        }));
        let _exits = tokio::spawn(exit_loop(Arc::downgrade(&inner), rx));
        Ok(Self { inner })
    }

    /// Configuration the engine was opened with.
    #[must_use]
    pub fn config(&self) -> &BurrowConfig {
        &self.inner.config
    }

    /// The root-filesystem manager backing the engine.
    #[must_use]
    pub fn rootfs(&self) -> &RootfsManager {
        &self.inner.rootfs
    }

    /// The process supervisor shared by every component.
    #[must_use]
    pub fn supervisor(&self) -> &Supervisor {
        &self.inner.supervisor
    }

    /// Creates a container bound to a ready environment.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::DuplicateName`] if the name is taken,
    /// [`BurrowError::NotFound`] for an unknown environment,
    /// [`BurrowError::NotReady`] if it is not ready, or a configuration
    /// error for malformed volume declarations.
    pub fn create_container(
        &self,
        name: &str,
        environment: &str,
        config: ContainerConfiguration,
    ) -> Result<Container> {
        validate_name("container", name)?;
        let _ = config.volume_binds()?;
        let env = self.inner.rootfs.environment(environment)?;
        if !env.is_ready() {
            return Err(BurrowError::NotReady {
                environment: environment.to_string(),
                status: env.status.to_string(),
            });
        }

        let mut registry = lock(&self.inner.registry);
        if registry.names.contains_key(name) {
            return Err(BurrowError::DuplicateName {
                kind: "container",
                name: name.to_string(),
            });
        }
        let root = self.inner.store.create_tree(name)?;
        let container = Container::new(name, environment, config, root);
        if let Err(e) = self.inner.store.save(&container) {
            let _ = self.inner.store.remove(name);
            return Err(e);
        }
        registry.insert(container.clone());
        drop(registry);

        tracing::info!(id = %container.id, name, environment, "container created");
        self.inner
            .events
            .publish(LifecycleEvent::for_container(&container, None));
        Ok(container)
    }

    /// Creates a container on the environment named after `distribution`,
    /// staging it first if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`RootfsManager::create_environment`] and
    /// [`Engine::create_container`].
    pub async fn create_container_for_distribution(
        &self,
        name: &str,
        distribution: &str,
        config: ContainerConfiguration,
        cancel: &CancellationToken,
    ) -> Result<Container> {
        validate_name("container", name)?;
        if lock(&self.inner.registry).names.contains_key(name) {
            return Err(BurrowError::DuplicateName {
                kind: "container",
                name: name.to_string(),
            });
        }
        match self.inner.rootfs.environment(distribution) {
            Ok(_) => {}
            Err(BurrowError::NotFound { .. }) => {
                tracing::info!(distribution, "staging environment for container");
                let _ = self
                    .inner
                    .rootfs
                    .create_environment(distribution, distribution, cancel)
                    .await?;
            }
            Err(e) => return Err(e),
        }
        self.create_container(name, distribution, config)
    }

    /// Starts a container's main process.
    ///
    /// Starting a running container is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::InvalidState`] from `Exited` or `Error`. A
    /// launch failure, including a destroyed environment, moves the
    /// container to `Error` and is returned. If the running state cannot be
    /// saved, the new process is killed and the container moves to `Error`.
    pub async fn start_container(&self, id: &ContainerId) -> Result<Container> {
        let slot = self.slot(id)?;
        let _environments = self.inner.environments.read().await;
        let mut st = slot.state.lock().await;
        ensure_present(&st, id)?;

        if st.container.state == ContainerState::Running {
            if st.handle.as_ref().is_some_and(|h| h.is_alive()) {
                tracing::debug!(id = %id, "start on running container is a no-op");
                return Ok(st.container.clone());
            }
            let code = st.handle.as_ref().and_then(|h| h.exit_code());
            self.mark_exited(&mut st, code)?;
        }
        if !st.container.state.can_start() {
            return Err(BurrowError::InvalidState {
                id: st.container.name.clone(),
                state: st.container.state.to_string(),
                operation: "start",
            });
        }

        let entry = match self.entry_spec(&st.container) {
            Ok(entry) => entry,
            Err(e) => return Err(self.fail(&mut st, e)),
        };
        let handle = match self
            .inner
            .rootfs
            .enter_environment(&st.container.environment, entry)
        {
            Ok(handle) => handle,
            Err(BurrowError::NotFound { id: environment, .. }) => {
                let cause = BurrowError::Launch {
                    environment,
                    reason: "environment no longer exists".into(),
                };
                return Err(self.fail(&mut st, cause));
            }
            Err(e) => return Err(self.fail(&mut st, e)),
        };

        let _ = lock(&self.inner.watches).insert(handle.id(), id.clone());
        if let Err(e) = self.record(&mut st.container, ContainerState::Running, |_| {}) {
            let _ = lock(&self.inner.watches).remove(&handle.id());
            if let Err(kill) = self
                .inner
                .supervisor
                .terminate(&handle, false, self.inner.config.stop_grace())
                .await
            {
                tracing::error!(id = %id, error = %kill, "failed to kill unrecorded main process");
            }
            return Err(self.fail(&mut st, e));
        }
        st.handle = Some(Arc::clone(&handle));
        tracing::info!(id = %id, pid = handle.pid(), command = handle.command(), "container started");

        // The reaper may have seen the death before the watch existed.
        if !handle.is_alive() {
            let _ = lock(&self.inner.watches).remove(&handle.id());
            self.mark_exited(&mut st, handle.exit_code())?;
        }
        Ok(st.container.clone())
    }

    /// Stops a container: SIGTERM, then SIGKILL after the grace period.
    ///
    /// Valid from every state; stopping a stopped container is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::TerminationTimeout`] if the process survives
    /// SIGKILL, after moving the container to `Error`.
    pub async fn stop_container(&self, id: &ContainerId) -> Result<Container> {
        let slot = self.slot(id)?;
        let mut st = slot.state.lock().await;
        ensure_present(&st, id)?;
        if st.container.state == ContainerState::Stopped {
            return Ok(st.container.clone());
        }

        let mut exit_code = None;
        if let Some(handle) = st.handle.take() {
            let _ = lock(&self.inner.watches).remove(&handle.id());
            match self
                .inner
                .supervisor
                .terminate(&handle, true, self.inner.config.stop_grace())
                .await
            {
                Ok(outcome) => exit_code = Some(outcome.exit_code()),
                Err(e) => {
                    st.handle = Some(handle);
                    return Err(self.fail(&mut st, e));
                }
            }
        }
        if let Err(e) = self.record(&mut st.container, ContainerState::Stopped, |c| {
            if let Some(code) = exit_code {
                c.exit_code = Some(code);
            }
        }) {
            return Err(self.fail(&mut st, e));
        }
        tracing::info!(id = %id, "container stopped");
        Ok(st.container.clone())
    }

    /// Runs `/bin/sh -c <command>` inside a running container's
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotRunning`] unless the container is running,
    /// and launch or cancellation errors from the execution itself.
    pub async fn execute_in_container(
        &self,
        id: &ContainerId,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput> {
        let slot = self.slot(id)?;
        let environment = {
            let st = slot.state.lock().await;
            ensure_present(&st, id)?;
            let alive = st.handle.as_ref().is_some_and(|h| h.is_alive());
            if st.container.state != ContainerState::Running || !alive {
                return Err(BurrowError::NotRunning {
                    container: st.container.name.clone(),
                    state: st.container.state.to_string(),
                });
            }
            st.container.environment.clone()
        };
        self.inner
            .rootfs
            .execute_in_environment(&environment, command, cancel)
            .await
    }

    /// Deletes a container's private tree and frees its name.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::InvalidState`] while the container runs.
    pub async fn remove_container(&self, id: &ContainerId) -> Result<()> {
        let slot = self.slot(id)?;
        let mut st = slot.state.lock().await;
        ensure_present(&st, id)?;
        if st.handle.as_ref().is_some_and(|h| h.is_alive()) {
            return Err(BurrowError::InvalidState {
                id: st.container.name.clone(),
                state: st.container.state.to_string(),
                operation: "remove",
            });
        }
        self.inner.store.remove(&st.container.name)?;
        st.removed = true;
        let mut registry = lock(&self.inner.registry);
        let _ = registry.slots.remove(id);
        let _ = registry.names.remove(&st.container.name);
        let _ = registry.snapshots.remove(&st.container.name);
        tracing::info!(id = %id, name = %st.container.name, "container removed");
        Ok(())
    }

    /// Destroys an environment no running container references.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::InUse`] while a running container references
    /// it, and the errors of [`RootfsManager::destroy_environment`].
    pub async fn destroy_environment(&self, name: &str) -> Result<()> {
        let _environments = self.inner.environments.write().await;
        if let Some(holder) = self
            .list_containers()
            .into_iter()
            .find(|c| c.environment == name && c.state == ContainerState::Running)
        {
            return Err(BurrowError::InUse {
                environment: name.to_string(),
                holder: format!("container {}", holder.name),
            });
        }
        self.inner.rootfs.destroy_environment(name)
    }

    /// Snapshot of every container, sorted by name.
    #[must_use]
    pub fn list_containers(&self) -> Vec<Container> {
        lock(&self.inner.registry).snapshots.values().cloned().collect()
    }

    /// Looks a container up by id.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] for an unknown id.
    pub fn container(&self, id: &ContainerId) -> Result<Container> {
        let registry = lock(&self.inner.registry);
        registry
            .snapshots
            .values()
            .find(|c| c.id == *id)
            .cloned()
            .ok_or_else(|| not_found(id.as_str()))
    }

    /// Looks a container up by name.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] for an unknown name.
    pub fn find_by_name(&self, name: &str) -> Result<Container> {
        lock(&self.inner.registry)
            .snapshots
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    /// Subscribes to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    /// Current resource readings of a container's main process.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] for an unknown id.
    pub async fn metrics(&self, id: &ContainerId) -> Result<MetricsSnapshot> {
        let slot = self.slot(id)?;
        let st = slot.state.lock().await;
        ensure_present(&st, id)?;
        let live = st.handle.as_ref().filter(|h| h.is_alive());
        let mut snapshot = collect_metrics(id, live.map(|h| h.pid()));
        snapshot.uptime_ms = live.map(|h| {
            u64::try_from((Utc::now() - h.started_at()).num_milliseconds()).unwrap_or(0)
        });
        Ok(snapshot)
    }

    /// Console output captured from a container's main process.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] for an unknown id, or an I/O error
    /// if the log exists but cannot be read.
    pub fn logs(&self, id: &ContainerId) -> Result<String> {
        let container = self.container(id)?;
        read_logs(&console_log_path(&container.root_path))
    }

    /// Stops every container still running, then the supervisor.
    pub async fn shutdown(&self) {
        let running: Vec<ContainerId> = self
            .list_containers()
            .into_iter()
            .filter(|c| c.state == ContainerState::Running)
            .map(|c| c.id)
            .collect();
        for id in running {
            if let Err(e) = self.stop_container(&id).await {
                tracing::error!(id = %id, error = %e, "failed to stop container during shutdown");
            }
        }
        self.inner
            .supervisor
            .shutdown(self.inner.config.stop_grace())
            .await;
        tracing::info!("engine shut down");
    }

    fn slot(&self, id: &ContainerId) -> Result<Arc<Slot>> {
        lock(&self.inner.registry)
            .slots
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id.as_str()))
    }

    fn entry_spec(&self, container: &Container) -> Result<EntrySpec> {
        let mut binds: Vec<(String, String)> = PRIVATE_BINDS
            .iter()
            .map(|(sub, guest)| {
                (
                    container.root_path.join(sub).display().to_string(),
                    (*guest).to_string(),
                )
            })
            .collect();
        binds.extend(container.config.volume_binds()?);
        Ok(EntrySpec {
            argv: container.config.entrypoint.clone(),
            env: container
                .config
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            working_dir: container.config.working_dir.clone(),
            binds,
            log_file: Some(console_log_path(&container.root_path)),
        })
    }

    /// Persists a transition plus `update`, then applies and publishes
    /// it. Nothing changes if the save fails.
    fn record(
        &self,
        container: &mut Container,
        to: ContainerState,
        update: impl FnOnce(&mut Container),
    ) -> Result<()> {
        let mut next = container.clone();
        next.transition(to)?;
        update(&mut next);
        self.inner.store.save(&next)?;
        self.commit(container, next);
        Ok(())
    }

    fn commit(&self, container: &mut Container, next: Container) {
        let from = container.state;
        *container = next;
        let _ = lock(&self.inner.registry)
            .snapshots
            .insert(container.name.clone(), container.clone());
        self.inner
            .events
            .publish(LifecycleEvent::for_container(container, Some(from)));
    }

    fn mark_exited(&self, st: &mut SlotState, exit_code: Option<i32>) -> Result<()> {
        st.handle = None;
        tracing::warn!(id = %st.container.id, code = ?exit_code, "container main process exited");
        self.record(&mut st.container, ContainerState::Exited, |c| c.exit_code = exit_code)
            .map_err(|e| self.fail(st, e))
    }

    /// Records an unexpected death reported by the reaper.
    async fn handle_exit(&self, notice: ExitNotice) {
        let Some(id) = lock(&self.inner.watches).remove(&notice.handle_id) else {
            return;
        };
        let Ok(slot) = self.slot(&id) else {
            return;
        };
        let mut st = slot.state.lock().await;
        let current = st.handle.as_ref().map(|h| h.id());
        if st.removed || current != Some(notice.handle_id) || notice.expected {
            return;
        }
        if let Err(e) = self.mark_exited(&mut st, Some(notice.exit_code)) {
            tracing::error!(id = %id, error = %e, "failed to record container exit");
        }
    }

    /// Moves the container to `Error` and hands `cause` back.
    ///
    /// The in-memory record moves to `Error` even when it cannot be saved.
    fn fail(&self, st: &mut SlotState, cause: BurrowError) -> BurrowError {
        tracing::error!(id = %st.container.id, error = %cause, "container failed");
        let mut next = st.container.clone();
        next.last_error = Some(cause.to_string());
        if let Err(e) = next.transition(ContainerState::Error) {
            tracing::error!(id = %st.container.id, error = %e, "cannot mark container failed");
            return cause;
        }
        if let Err(e) = self.inner.store.save(&next) {
            tracing::error!(id = %st.container.id, error = %e, "failed to persist container error");
        }
        self.commit(&mut st.container, next);
        cause
    }
}

impl Registry {
    fn insert(&mut self, container: Container) {
        let id = container.id.clone();
        let _ = self.names.insert(container.name.clone(), id.clone());
        let _ = self.snapshots.insert(container.name.clone(), container.clone());
        let _ = self.slots.insert(
            id,
            Arc::new(Slot {
                state: tokio::sync::Mutex::new(SlotState {
                    container,
                    handle: None,
                    removed: false,
                }),
            }),
        );
    }
}

async fn exit_loop(inner: Weak<Inner>, mut rx: mpsc::UnboundedReceiver<ExitNotice>) {
    while let Some(notice) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        Engine { inner }.handle_exit(notice).await;
    }
    tracing::debug!("exit watcher stopped");
}

fn ensure_present(st: &SlotState, id: &ContainerId) -> Result<()> {
    if st.removed {
        return Err(not_found(id.as_str()));
    }
    Ok(())
}

fn not_found(id: &str) -> BurrowError {
    BurrowError::NotFound {
        kind: "container",
        id: id.to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use burrow_common::types::Distribution;

    use super::*;

    const LAUNCHER: &str = "#!/bin/sh\n\
        while [ $# -gt 0 ]; do\n\
          case \"$1\" in\n\
            -r) shift 2 ;;\n\
            -b|-w) shift 2 ;;\n\
            -0|--link2symlink|--kill-on-exit) shift ;;\n\
            *) break ;;\n\
          esac\n\
        done\n\
        exec \"$@\"\n";

    async fn engine_with_container(dir: &std::path::Path) -> (Engine, ContainerId) {
        let launcher = dir.join("launcher");
        std::fs::write(&launcher, LAUNCHER).expect("write launcher");
        std::fs::set_permissions(&launcher, std::fs::Permissions::from_mode(0o755))
            .expect("chmod");
        let tree = dir.join("tree");
        std::fs::create_dir_all(tree.join("etc")).expect("tree");
        std::fs::write(tree.join("etc/hostname"), b"tree").expect("hostname");

        let mut config = BurrowConfig::with_data_dir(dir.join("data"));
        config.launcher = launcher;
        config.reaper_interval_ms = 50;
        config.stop_grace_ms = 1_000;
        config.min_free_bytes = 0;
        let engine = Engine::open(config).expect("open");
        engine
            .rootfs()
            .register_distribution(Distribution {
                name: "tree".into(),
                display_name: "Tree".into(),
                package_manager: "none".into(),
                archive: format!("file://{}", tree.display()),
                sha256: None,
            })
            .expect("register");
        let container = engine
            .create_container_for_distribution(
                "c1",
                "tree",
                ContainerConfiguration::default(),
                &CancellationToken::new(),
            )
            .await
            .expect("create");
        (engine, container.id)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn stop_issued_during_start_acts_on_its_outcome() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (engine, id) = engine_with_container(dir.path()).await;

        let slot = engine.slot(&id).expect("slot");
        let held = slot.state.lock().await;

        let starter = engine.clone();
        let start_id = id.clone();
        let start = tokio::spawn(async move { starter.start_container(&start_id).await });
        settle().await;
        let stopper = engine.clone();
        let stop_id = id.clone();
        let stop = tokio::spawn(async move { stopper.stop_container(&stop_id).await });
        settle().await;

        assert!(!start.is_finished());
        assert!(!stop.is_finished());
        drop(held);

        let started = start.await.expect("join start").expect("start");
        assert_eq!(started.state, ContainerState::Running);
        let stopped = stop.await.expect("join stop").expect("stop");
        assert_eq!(stopped.state, ContainerState::Stopped);
        assert_eq!(engine.container(&id).expect("container").state, ContainerState::Stopped);
        assert_eq!(engine.supervisor().live_count(), 0);
    }

    #[tokio::test]
    async fn failed_save_keeps_memory_and_snapshot_in_step() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (engine, id) = engine_with_container(dir.path()).await;
        let mut container = engine.container(&id).expect("container");
        let record = dir.path().join("data/containers/c1/container.json");
        std::fs::remove_file(&record).expect("remove record");
        std::fs::create_dir(&record).expect("block record");

        let err = engine
            .record(&mut container, ContainerState::Running, |_| {})
            .unwrap_err();
        assert!(matches!(err, BurrowError::Io { .. }));
        assert_eq!(container.state, ContainerState::Created);
        assert_eq!(
            engine.container(&id).expect("snapshot").state,
            ContainerState::Created
        );
    }

    #[tokio::test]
    async fn unsaved_start_kills_the_process_and_fails_the_container() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (engine, id) = engine_with_container(dir.path()).await;
        let record = dir.path().join("data/containers/c1/container.json");
        std::fs::remove_file(&record).expect("remove record");
        std::fs::create_dir(&record).expect("block record");

        let err = engine.start_container(&id).await.unwrap_err();
        assert!(matches!(err, BurrowError::Io { .. }));
        assert_eq!(engine.supervisor().live_count(), 0);
        assert_eq!(engine.container(&id).expect("snapshot").state, ContainerState::Error);
        let exec = engine
            .execute_in_container(&id, "true", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(exec, BurrowError::NotRunning { .. }));
    }
}
