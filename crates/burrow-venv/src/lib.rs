//! # burrow-venv
//!
//! Interpreter-environment manager for the Burrow runtime.
//!
//! Creates isolated package sets for a language runtime (Python `venv` by
//! default) on the host, installs packages into them, and keeps track of
//! which one is active. Bootstrap and install commands run through the
//! process supervisor, so cancelling an operation never orphans a child.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod manager;
pub mod toolchain;

pub use manager::{InterpreterEnvironment, InterpreterManager};
pub use toolchain::{PythonToolchain, RuntimeToolchain};
