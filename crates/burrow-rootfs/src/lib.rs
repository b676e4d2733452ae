//! # burrow-rootfs
//!
//! Root-filesystem manager for the Burrow runtime.
//!
//! Handles the distribution catalog, atomic staging of root trees from
//! local directories, local archives, or downloads (with SHA-256
//! verification), and rooted process entry and one-shot execution through
//! the syscall-interception launcher.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod catalog;
pub mod environment;
pub mod extract;
pub mod hash;
pub mod manager;
pub mod source;
pub mod staging;
pub mod storage;

pub use catalog::DistributionCatalog;
pub use environment::Environment;
pub use manager::{EntrySpec, RootfsManager};
