//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File not found at the specified path.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// The configuration could not be parsed or extracted.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {message}")]
    ValidationError { message: String },

    /// Missing required field.
    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    /// Two instances of one declaration share an id.
    #[error("Duplicate instance id '{id}' in extension '{extension}'")]
    DuplicateInstanceId { extension: String, id: String },

    /// Two instances resolve to the same directory.
    #[error("Instances '{first}' and '{second}' both resolve to {}", path.display())]
    DuplicatePath {
        path: PathBuf,
        first: String,
        second: String,
    },

    /// An override entry cannot be applied.
    #[error("Malformed override in extension '{extension}': {reason}")]
    MalformedOverride { extension: String, reason: String },

    /// Invalid socket address.
    #[error("Invalid address: {addr} - {reason}")]
    InvalidAddress { addr: String, reason: String },
}

impl ConfigError {
    /// Creates a validation error with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates a malformed override error.
    pub fn malformed_override(extension: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedOverride {
            extension: extension.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid address error.
    pub fn invalid_address(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            addr: addr.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
