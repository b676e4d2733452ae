//! Container lifecycle management for the Burrow runtime.
//!
//! A container here is a supervised process rooted in a staged environment
//! by the syscall-interception launcher, plus a private directory tree and
//! a persisted record. It is not an isolation boundary: there are no
//! namespaces and no cgroups, and resource fields in the configuration are
//! advisory metadata.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod container;
pub mod engine;
pub mod events;
pub mod logs;
pub mod metrics;
pub mod state;

pub use container::Container;
pub use engine::Engine;
pub use events::LifecycleEvent;
pub use metrics::MetricsSnapshot;
