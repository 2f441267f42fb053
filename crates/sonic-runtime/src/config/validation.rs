//! Configuration validation utilities.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::PathBuf;

use sonic_core::ExtensionDeclaration;

use super::error::{ConfigError, ConfigResult};
use super::schema::{AppConfig, BrokerBackend, BrokerConfig, MetadataConfig, StatusConfig};
use crate::expander;

/// Validates the entire configuration.
pub fn validate_config(config: &AppConfig) -> ConfigResult<()> {
    validate_metadata(&config.metadata)?;
    validate_status(&config.status)?;
    validate_broker(&config.broker)?;
    validate_categories(config)?;
    validate_extensions(&config.extensions, &config.metadata)?;
    Ok(())
}

/// Validates engine-wide settings.
fn validate_metadata(metadata: &MetadataConfig) -> ConfigResult<()> {
    if metadata.poll_interval_ms == 0 {
        return Err(ConfigError::validation(
            "Poll interval must be greater than 0",
        ));
    }
    if metadata.extensions_folder.as_os_str().is_empty() {
        return Err(ConfigError::missing_field("metadata.extensions_folder"));
    }
    Ok(())
}

/// Validates the status endpoint address.
fn validate_status(status: &StatusConfig) -> ConfigResult<()> {
    if !status.enabled {
        return Ok(());
    }
    status
        .addr
        .parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|e| ConfigError::invalid_address(&status.addr, e.to_string()))
}

/// Requires a redis URL when the redis backend is selected.
fn validate_broker(broker: &BrokerConfig) -> ConfigResult<()> {
    if broker.backend != BrokerBackend::Redis {
        return Ok(());
    }
    let url = broker.url.trim();
    if url.is_empty() {
        return Err(ConfigError::missing_field("broker.url"));
    }
    let scheme = url.split_once("://").map(|(scheme, _)| scheme);
    match scheme {
        Some("redis" | "rediss" | "unix" | "redis+unix") => Ok(()),
        _ => Err(ConfigError::invalid_address(
            url,
            "expected a redis:// or rediss:// URL",
        )),
    }
}

/// Rejects duplicate category names.
fn validate_categories(config: &AppConfig) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for category in &config.categories {
        if !seen.insert(&category.name) {
            return Err(ConfigError::validation(format!(
                "Duplicate category: {}",
                category.name
            )));
        }
    }
    Ok(())
}

/// Validates declarations and the instances they expand to.
fn validate_extensions(
    extensions: &[ExtensionDeclaration],
    metadata: &MetadataConfig,
) -> ConfigResult<()> {
    let mut paths: HashMap<PathBuf, String> = HashMap::new();

    for declaration in extensions {
        validate_declaration(declaration)?;

        for instance in expander::expand(declaration, &metadata.extensions_folder)? {
            validate_identifier(&instance.id, "extension.override key")?;
            validate_identifier(&instance.category, "extension.override category")?;
            let qualified = format!("{}/{}", instance.category, instance.id);
            if let Some(first) = paths.insert(instance.path.clone(), qualified.clone()) {
                return Err(ConfigError::DuplicatePath {
                    path: instance.path,
                    first,
                    second: qualified,
                });
            }
        }
    }

    Ok(())
}

/// Validates a single declaration.
fn validate_declaration(declaration: &ExtensionDeclaration) -> ConfigResult<()> {
    validate_identifier(&declaration.id, "extension.id")?;
    validate_identifier(&declaration.category, "extension.category")?;
    if declaration.source.trim().is_empty() {
        return Err(ConfigError::missing_field("extension.source"));
    }
    Ok(())
}

/// Ids and categories become path components.
fn validate_identifier(value: &str, field: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::missing_field(field));
    }
    if value.contains(['/', '\\']) || value == "." || value == ".." {
        return Err(ConfigError::validation(format!(
            "{field} '{value}' must be a single path component"
        )));
    }
    Ok(())
}
