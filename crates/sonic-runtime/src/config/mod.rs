//! Configuration module for the Sonic runtime.
//!
//! This module provides layered configuration loading and validation for
//! engine settings, logging, the status endpoint and extension declarations.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    AppConfig, BrokerBackend, BrokerConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, MetadataConfig,
    SpanEventConfig, StatusConfig,
};
pub use validation::validate_config;
