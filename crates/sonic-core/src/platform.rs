//! Host platform detection and isolated environment layout.

use std::path::{Path, PathBuf};

use crate::error::{HostError, HostResult};

/// Name of the isolated environment directory inside an instance.
pub const ENVIRONMENT_DIR: &str = ".venv";

/// Generated package entry point of an instance.
pub const BOOTSTRAP_FILE: &str = "__init__.py";

/// Generated plugin manifest marking a provisioned instance.
pub const PLUGIN_MANIFEST: &str = "main.sonic-plugin";

/// Operating systems that extensions can be provisioned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    Linux,
    Windows,
}

impl HostPlatform {
    /// Detects the platform this process runs on.
    pub fn current() -> HostResult<Self> {
        Self::from_os(std::env::consts::OS)
    }

    /// Maps an OS name as reported by `std::env::consts::OS`.
    pub fn from_os(os: &str) -> HostResult<Self> {
        match os {
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            other => Err(HostError::UnsupportedPlatform {
                os: other.to_string(),
            }),
        }
    }

    /// Returns the interpreter inside an environment directory.
    pub fn interpreter(&self, venv: &Path) -> PathBuf {
        match self {
            Self::Linux => venv.join("bin").join("python"),
            Self::Windows => venv.join("Scripts").join("python.exe"),
        }
    }

    /// Returns the primary and 64-bit site-packages directories, relative to
    /// the instance directory, using `/` separators.
    pub fn site_packages(&self, language_version: &str) -> [String; 2] {
        match self {
            Self::Linux => [
                format!("{ENVIRONMENT_DIR}/lib/python{language_version}/site-packages"),
                format!("{ENVIRONMENT_DIR}/lib64/python{language_version}/site-packages"),
            ],
            Self::Windows => [
                format!("{ENVIRONMENT_DIR}/Lib/site-packages"),
                format!("{ENVIRONMENT_DIR}/Lib/site-packages"),
            ],
        }
    }
}
