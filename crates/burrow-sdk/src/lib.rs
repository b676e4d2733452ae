//! # burrow-sdk
//!
//! Public SDK for using Burrow as a Rust library.
//!
//! Provides three main entry points:
//! - [`Burrow`](client::Burrow): owns the engine and interpreter environments.
//! - [`ContainerBuilder`](builder::ContainerBuilder): fluent API for configuring and creating containers.
//! - [`EventListener`](event::EventListener): subscribes to container lifecycle events.
//!
//! # Example
//!
//! ```rust,no_run
//! use burrow_common::config::BurrowConfig;
//! use burrow_sdk::{Burrow, ContainerBuilder};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> burrow_common::error::Result<()> {
//! let burrow = Burrow::open(BurrowConfig::load(None)?)?;
//! let container = ContainerBuilder::new("shell")
//!     .distribution("alpine")
//!     .memory_limit(128 * 1024 * 1024)
//!     .create(burrow.engine(), &CancellationToken::new())
//!     .await?;
//! burrow.engine().start_container(&container.id).await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod builder;
pub mod client;
pub mod event;

pub use builder::ContainerBuilder;
pub use client::Burrow;
pub use event::EventListener;
