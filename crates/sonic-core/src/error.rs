//! Unified error types for the Sonic core.
//!
//! Collaborator failures (process spawns, filesystem, plugin processes) are
//! reported as [`HostError`]; message bus failures as [`BusError`].
//! Orchestration-level errors live in `sonic-runtime`.

use std::path::PathBuf;

use thiserror::Error;

// =============================================================================
// Host Errors
// =============================================================================

/// Errors reported by external collaborators.
#[derive(Debug, Clone, Error)]
pub enum HostError {
    /// A child process could not be started.
    #[error("failed to spawn '{program}': {reason}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// Reason for failure.
        reason: String,
    },

    /// A child process exited unsuccessfully.
    #[error("'{program}' exited with status {status:?}: {stderr}")]
    CommandFailed {
        /// The program that failed.
        program: String,
        /// Exit code, if the process was not killed by a signal.
        status: Option<i32>,
        /// Captured standard error output.
        stderr: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// A required capability was not registered in the host context.
    #[error("capability '{capability}' not available")]
    NotAvailable {
        /// The missing capability.
        capability: &'static str,
    },

    /// The host operating system is not supported.
    #[error("unsupported platform: {os}")]
    UnsupportedPlatform {
        /// The detected operating system name.
        os: String,
    },

    /// The plugin at `path` is not activated.
    #[error("plugin at {} is not activated", path.display())]
    NotActivated {
        /// The plugin directory.
        path: PathBuf,
    },

    /// The control channel of a plugin has been closed.
    #[error("control channel closed for plugin at {}", path.display())]
    ChannelClosed {
        /// The plugin directory.
        path: PathBuf,
    },

    /// Failed to serialize a message.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The message broker could not be set up.
    #[error(transparent)]
    Broker(#[from] BusError),
}

impl From<std::io::Error> for HostError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for HostError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Bus Errors
// =============================================================================

/// Errors that can occur talking to the publish/subscribe broker.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// The broker cannot be reached.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// The subscription has been closed by the broker.
    #[error("subscription to '{channel}' closed")]
    SubscriptionClosed {
        /// The subscribed channel.
        channel: String,
    },

    /// Other broker error.
    #[error("{0}")]
    Other(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for collaborator operations.
pub type HostResult<T> = Result<T, HostError>;

/// Result type for broker operations.
pub type BusResult<T> = Result<T, BusError>;
