//! Fluent API for configuring and creating containers.

use std::collections::BTreeMap;

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::ContainerConfiguration;
use burrow_runtime::{Container, Engine};
use tokio_util::sync::CancellationToken;

/// Where a container's root tree comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Base {
    /// An existing environment, by name.
    Environment(String),
    /// A catalog distribution, staged on first use.
    Distribution(String),
}

/// Builder for configuring a container before creation.
///
/// ```rust,no_run
/// # async fn demo(engine: &burrow_runtime::Engine) -> burrow_common::error::Result<()> {
/// use burrow_sdk::builder::ContainerBuilder;
/// use tokio_util::sync::CancellationToken;
///
/// let container = ContainerBuilder::new("web")
///     .distribution("alpine")
///     .entrypoint(["/bin/sh", "-c", "httpd -f"])
///     .env("PORT", "8080")
///     .volume("/sdcard/site", "/srv")
///     .create(engine, &CancellationToken::new())
///     .await?;
/// engine.start_container(&container.id).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    name: String,
    base: Option<Base>,
    entrypoint: Vec<String>,
    env: BTreeMap<String, String>,
    volumes: Vec<String>,
    working_dir: Option<String>,
    memory_limit_bytes: Option<u64>,
    cpu_quota: Option<f64>,
    ports: Vec<u16>,
}

impl ContainerBuilder {
    /// Creates a new builder with the given container name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
            entrypoint: Vec::new(),
            env: BTreeMap::new(),
            volumes: Vec::new(),
            working_dir: None,
            memory_limit_bytes: None,
            cpu_quota: None,
            ports: Vec::new(),
        }
    }

    /// Roots the container in an existing, ready environment.
    #[must_use]
    pub fn environment(mut self, name: impl Into<String>) -> Self {
        self.base = Some(Base::Environment(name.into()));
        self
    }

    /// Roots the container in the environment named after a distribution,
    /// staging it if it does not exist yet.
    #[must_use]
    pub fn distribution(mut self, name: impl Into<String>) -> Self {
        self.base = Some(Base::Distribution(name.into()));
        self
    }

    /// Sets the main process argv. Without one the guest shell runs.
    #[must_use]
    pub fn entrypoint<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entrypoint = argv.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an environment variable for the main process.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.env.insert(key.into(), value.into());
        self
    }

    /// Binds a host path into the container.
    #[must_use]
    pub fn volume(mut self, host: impl AsRef<str>, guest: impl AsRef<str>) -> Self {
        self.volumes
            .push(format!("{}:{}", host.as_ref(), guest.as_ref()));
        self
    }

    /// Sets the working directory inside the root tree.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Records a memory ceiling in bytes. Advisory only.
    #[must_use]
    pub const fn memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit_bytes = Some(bytes);
        self
    }

    /// Records a CPU quota as a fraction of one CPU. Advisory only.
    #[must_use]
    pub const fn cpu_quota(mut self, quota: f64) -> Self {
        self.cpu_quota = Some(quota);
        self
    }

    /// Records a port the container listens on. Not forwarded.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.ports.push(port);
        self
    }

    /// Returns the configuration this builder would create with.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a negative or non-finite CPU quota
    /// or a malformed volume.
    pub fn configuration(&self) -> Result<ContainerConfiguration> {
        if let Some(quota) = self.cpu_quota {
            if !quota.is_finite() || quota <= 0.0 {
                return Err(BurrowError::Config {
                    message: format!("cpu quota must be a positive number, got {quota}"),
                });
            }
        }
        let config = ContainerConfiguration {
            memory_limit_bytes: self.memory_limit_bytes,
            cpu_quota: self.cpu_quota,
            volumes: self.volumes.clone(),
            env: self.env.clone(),
            ports: self.ports.clone(),
            entrypoint: self.entrypoint.clone(),
            working_dir: self.working_dir.clone(),
        };
        let _ = config.volume_binds()?;
        Ok(config)
    }

    /// Creates the container (does not start it).
    ///
    /// # Errors
    ///
    /// Returns a configuration error if neither an environment nor a
    /// distribution was given, and otherwise the engine's creation errors.
    pub async fn create(self, engine: &Engine, cancel: &CancellationToken) -> Result<Container> {
        let config = self.configuration()?;
        match self.base {
            Some(Base::Environment(env)) => engine.create_container(&self.name, &env, config),
            Some(Base::Distribution(dist)) => {
                engine
                    .create_container_for_distribution(&self.name, &dist, config, cancel)
                    .await
            }
            None => Err(BurrowError::Config {
                message: format!(
                    "container '{}' needs an environment or a distribution",
                    self.name
                ),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_carries_every_setting() {
        let config = ContainerBuilder::new("web")
            .environment("alpine")
            .entrypoint(["/bin/sh", "-c", "true"])
            .env("A", "1")
            .volume("/host/site", "/srv")
            .working_dir("/srv")
            .memory_limit(64 << 20)
            .cpu_quota(0.5)
            .port(8080)
            .configuration()
            .expect("config");
        assert_eq!(config.entrypoint, ["/bin/sh", "-c", "true"]);
        assert_eq!(config.env.get("A").map(String::as_str), Some("1"));
        assert_eq!(config.volumes, ["/host/site:/srv"]);
        assert_eq!(config.working_dir.as_deref(), Some("/srv"));
        assert_eq!(config.memory_limit_bytes, Some(64 << 20));
        assert_eq!(config.cpu_quota, Some(0.5));
        assert_eq!(config.ports, [8080]);
    }

    #[test]
    fn later_base_wins() {
        let builder = ContainerBuilder::new("web")
            .environment("a")
            .distribution("b");
        assert_eq!(builder.base, Some(Base::Distribution("b".into())));
    }

    #[test]
    fn rejects_bad_cpu_quota() {
        let err = ContainerBuilder::new("web")
            .cpu_quota(-1.0)
            .configuration()
            .unwrap_err();
        assert!(matches!(err, BurrowError::Config { .. }));
    }

    #[test]
    fn rejects_half_volume() {
        let err = ContainerBuilder::new("web")
            .volume("", "/srv")
            .configuration()
            .unwrap_err();
        assert!(matches!(err, BurrowError::Config { .. }));
    }
}
