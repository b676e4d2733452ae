//! # burrow-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the entire Burrow workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the primitives that the supervisor, the
//! root-filesystem manager, the interpreter manager, and the lifecycle
//! engine build upon.
//!
//! Burrow containers are *not* an isolation boundary. Processes are jailed
//! to a root tree by a user-space syscall-interception launcher; there are
//! no namespaces, no cgroups, and no seccomp filters.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
