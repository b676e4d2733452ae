//! Single entry point owning the container engine and the interpreter
//! environments, sharing one process supervisor.

use burrow_common::config::BurrowConfig;
use burrow_common::error::Result;
use burrow_runtime::Engine;
use burrow_venv::InterpreterManager;

use crate::event::EventListener;

/// Handle to a Burrow data directory.
#[derive(Debug)]
pub struct Burrow {
    engine: Engine,
    venvs: InterpreterManager,
}

impl Burrow {
    /// Opens the data directory named by `config`, recovering persisted
    /// state. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be prepared or its
    /// records cannot be read.
    pub fn open(config: BurrowConfig) -> Result<Self> {
        let engine = Engine::open(config)?;
        let venvs = InterpreterManager::open(engine.config(), engine.supervisor().clone())?;
        tracing::debug!(data_dir = %engine.config().data_dir.display(), "burrow opened");
        Ok(Self { engine, venvs })
    }

    /// The container lifecycle engine.
    #[must_use]
    pub const fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The interpreter-environment manager.
    #[must_use]
    pub const fn venvs(&self) -> &InterpreterManager {
        &self.venvs
    }

    /// Listener for lifecycle events published from now on.
    #[must_use]
    pub fn events(&self) -> EventListener {
        EventListener::new(&self.engine)
    }

    /// Stops every running container and reaps all supervised processes.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }
}
