//! Runtime error types.

use std::path::PathBuf;

use sonic_core::{BusError, HostError};
use thiserror::Error;

use crate::config::ConfigError;

// =============================================================================
// Provisioning
// =============================================================================

/// Errors raised while provisioning one instance.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The repository could not be cloned.
    #[error("Failed to fetch '{instance}': {source}")]
    Fetch {
        instance: String,
        #[source]
        source: HostError,
    },

    /// The local source could not be copied.
    #[error("Failed to copy '{instance}': {source}")]
    Copy {
        instance: String,
        #[source]
        source: HostError,
    },

    /// An existing instance directory could not be removed.
    #[error("Failed to remove {}: {reason}", path.display())]
    Remove { path: PathBuf, reason: String },

    /// A generated file could not be written.
    #[error("Failed to write {}: {reason}", path.display())]
    Artifact { path: PathBuf, reason: String },

    /// The replace prompt failed.
    #[error("Replace prompt failed for {}: {source}", path.display())]
    Prompt {
        path: PathBuf,
        #[source]
        source: HostError,
    },

    /// A collaborator is not registered.
    #[error(transparent)]
    Host(#[from] HostError),

    /// The host platform is not supported.
    #[error("Unsupported platform: {os}")]
    UnsupportedPlatform { os: String },

    /// The dependency manifest of an instance does not exist.
    #[error("Requirements file not found for '{instance}': {}", path.display())]
    ManifestMissing { instance: String, path: PathBuf },
}

impl ProvisionError {
    /// Returns whether the error stops the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedPlatform { .. } | Self::ManifestMissing { .. } | Self::Host(_)
        )
    }
}

/// Result type for provisioning.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

// =============================================================================
// Supervision
// =============================================================================

/// Errors raised by the plugin supervisor.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// No resolved configuration matches a discovered plugin.
    #[error("No configuration matches plugin at {}", path.display())]
    Unmatched { path: PathBuf },

    /// A collaborator failed.
    #[error("Plugin '{instance}': {source}")]
    Plugin {
        instance: String,
        #[source]
        source: HostError,
    },

    /// Discovery failed.
    #[error("Plugin discovery failed: {0}")]
    Discovery(#[source] HostError),
}

// =============================================================================
// Engine
// =============================================================================

/// Errors that end an engine run.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Provisioning hit an error that halts the run.
    #[error("Fatal provisioning error: {0}")]
    Fatal(#[source] ProvisionError),

    /// The broker cannot be reached.
    #[error("Message broker is not available: {0}")]
    BrokerUnavailable(#[source] BusError),

    /// Supervision could not start.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// The status endpoint could not be started.
    #[error("Status server failed: {0}")]
    Status(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
