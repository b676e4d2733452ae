//! Runtime toolchain abstraction.
//!
//! A toolchain knows how to bootstrap an interpreter environment, how to
//! tell a finished one from a half-built one, and how to install a package
//! into it.

use std::path::{Path, PathBuf};

use burrow_core::CommandSpec;

/// Language runtime able to host interpreter environments.
pub trait RuntimeToolchain: Send + Sync + std::fmt::Debug {
    /// Version recorded when the caller does not ask for one.
    fn default_version(&self) -> String;

    /// Command creating an environment rooted at `root`.
    fn bootstrap_command(&self, root: &Path, runtime_version: &str) -> CommandSpec;

    /// Files that exist only in a completely bootstrapped environment.
    fn marker_files(&self, root: &Path) -> Vec<PathBuf>;

    /// Command installing `package` into the environment at `root`.
    fn install_command(&self, root: &Path, package: &str) -> CommandSpec;
}

/// CPython `venv` + `pip` toolchain.
#[derive(Debug, Clone)]
pub struct PythonToolchain {
    interpreter: String,
}

impl PythonToolchain {
    /// Uses `interpreter` (a name on `PATH` or a path) for bootstrapping.
    #[must_use]
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    fn interpreter_for(&self, runtime_version: &str) -> String {
        if runtime_version == self.interpreter
            || runtime_version.starts_with("python")
            || runtime_version.contains('/')
        {
            runtime_version.to_string()
        } else {
            format!("python{runtime_version}")
        }
    }
}

impl RuntimeToolchain for PythonToolchain {
    fn default_version(&self) -> String {
        self.interpreter.clone()
    }

    fn bootstrap_command(&self, root: &Path, runtime_version: &str) -> CommandSpec {
        CommandSpec::new(self.interpreter_for(runtime_version)).args([
            "-m".to_string(),
            "venv".to_string(),
            root.display().to_string(),
        ])
    }

    fn marker_files(&self, root: &Path) -> Vec<PathBuf> {
        vec![root.join("bin").join("python"), root.join("pyvenv.cfg")]
    }

    fn install_command(&self, root: &Path, package: &str) -> CommandSpec {
        CommandSpec::new(root.join("bin").join("python"))
            .args(["-m", "pip", "install", "--disable-pip-version-check", package])
            .env("PIP_NO_INPUT", "1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_selects_interpreter() {
        let python = PythonToolchain::new("python3");
        let root = Path::new("/data/venvs/web");
        assert_eq!(
            python.bootstrap_command(root, "3.12").to_string(),
            "python3.12 -m venv /data/venvs/web"
        );
        assert_eq!(
            python
                .bootstrap_command(root, &python.default_version())
                .to_string(),
            "python3 -m venv /data/venvs/web"
        );
    }

    #[test]
    fn install_runs_environment_pip() {
        let python = PythonToolchain::new("python3");
        let spec = python.install_command(Path::new("/v/web"), "requests==2.32.3");
        assert_eq!(spec.program, PathBuf::from("/v/web/bin/python"));
        assert_eq!(spec.args.last().map(String::as_str), Some("requests==2.32.3"));
    }

    #[test]
    fn markers_cover_interpreter_and_metadata() {
        let python = PythonToolchain::new("python3");
        let markers = python.marker_files(Path::new("/v/web"));
        assert!(markers.contains(&PathBuf::from("/v/web/pyvenv.cfg")));
        assert!(markers.contains(&PathBuf::from("/v/web/bin/python")));
    }
}
