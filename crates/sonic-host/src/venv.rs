//! Isolated Python environments and dependency installation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sonic_core::{DependencyInstaller, EnvironmentBuilder, EnvironmentStatus, HostError, HostResult};
use tracing::{debug, info};

use crate::command::{command, run};

const VERSION_SCRIPT: &str = "import sys; print('%d.%d' % sys.version_info[:2])";

/// Builds environments with `python -m virtualenv`.
#[derive(Debug, Clone)]
pub struct VirtualenvBuilder {
    python: PathBuf,
}

impl VirtualenvBuilder {
    /// Uses `python` from `PATH`.
    pub fn new() -> Self {
        Self::with_python("python")
    }

    /// Uses a specific base interpreter.
    pub fn with_python(python: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
        }
    }

    fn program(&self) -> String {
        self.python.display().to_string()
    }
}

impl Default for VirtualenvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnvironmentBuilder for VirtualenvBuilder {
    async fn ensure(&self, venv: &Path) -> HostResult<EnvironmentStatus> {
        if venv.exists() {
            return Ok(EnvironmentStatus::AlreadyPresent);
        }

        let mut cmd = command(&self.python);
        cmd.args(["-m", "virtualenv"]).arg(venv);
        run(cmd, &self.program()).await?;
        info!(path = %venv.display(), "Virtual environment created");
        Ok(EnvironmentStatus::Created)
    }

    async fn language_version(&self) -> HostResult<String> {
        let mut cmd = command(&self.python);
        cmd.args(["-c", VERSION_SCRIPT]);
        let output = run(cmd, &self.program()).await?;
        parse_version(&output)
    }
}

fn parse_version(output: &str) -> HostResult<String> {
    let version = output.trim();
    let valid = version
        .split_once('.')
        .is_some_and(|(major, minor)| {
            !major.is_empty()
                && !minor.is_empty()
                && major.chars().all(|c| c.is_ascii_digit())
                && minor.chars().all(|c| c.is_ascii_digit())
        });
    if !valid {
        return Err(HostError::Io(format!(
            "unexpected interpreter version output: {version:?}"
        )));
    }
    debug!(version, "Interpreter version");
    Ok(version.to_string())
}

/// Installs requirements with `<interpreter> -m pip install -r <manifest>`.
#[derive(Debug, Clone, Default)]
pub struct PipInstaller;

impl PipInstaller {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DependencyInstaller for PipInstaller {
    async fn install(&self, interpreter: &Path, manifest: &Path) -> HostResult<()> {
        let mut cmd = command(interpreter);
        cmd.args(["-m", "pip", "install", "-r"]).arg(manifest);
        if let Some(dir) = manifest.parent() {
            cmd.current_dir(dir);
        }
        run(cmd, &interpreter.display().to_string()).await?;
        debug!(manifest = %manifest.display(), "pip install finished");
        Ok(())
    }
}
