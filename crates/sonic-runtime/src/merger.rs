//! Merging of an extension's bundled `config.yaml` into its resolved
//! configuration.
//!
//! Values coming from the declaration always win; the local file only fills
//! what the declaration leaves unset.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Format, Yaml};
use sonic_core::{ChannelRole, ExtensionGlobalConfig, InstanceOverride};
use tracing::{debug, warn};

/// Local configuration file names, in lookup order.
pub const LOCAL_CONFIG_FILES: [&str; 2] = ["config.yaml", "config.yml"];

/// Returns the local configuration file inside `dir`, if any.
pub fn find_local_config(dir: &Path) -> Option<PathBuf> {
    LOCAL_CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Reads a local configuration file.
pub fn read_local_config(path: &Path) -> Result<InstanceOverride, figment::Error> {
    Figment::from(Yaml::file(path)).extract()
}

/// Merges `local_file` into `resolved`.
///
/// A missing or unreadable file leaves the configuration untouched.
pub fn merge(resolved: &ExtensionGlobalConfig, local_file: &Path) -> ExtensionGlobalConfig {
    let mut merged = resolved.clone();

    if !local_file.is_file() {
        debug!(
            instance = %resolved.id,
            path = %local_file.display(),
            "No local configuration"
        );
        return merged;
    }

    match read_local_config(local_file) {
        Ok(local) => {
            merged.fill_from(&local);
            debug!(
                instance = %resolved.id,
                path = %local_file.display(),
                "Merged local configuration"
            );
        }
        Err(e) => {
            warn!(
                instance = %resolved.id,
                path = %local_file.display(),
                error = %e,
                "Failed to parse local configuration, keeping declared values"
            );
        }
    }

    merged
}

/// Merges the local configuration found in the instance directory and
/// checks the resulting channel bindings.
pub fn merge_local(resolved: &ExtensionGlobalConfig) -> ExtensionGlobalConfig {
    let local_file = find_local_config(&resolved.path)
        .unwrap_or_else(|| resolved.path.join(LOCAL_CONFIG_FILES[0]));
    let merged = merge(resolved, &local_file);
    let _ = check_channels(&merged);
    merged
}

/// Matches the channel bindings of `config` against the known roles.
///
/// Returns the matched role, or the closest role and the fields it still
/// needs. A mismatch is only logged.
pub fn check_channels(
    config: &ExtensionGlobalConfig,
) -> Result<ChannelRole, (ChannelRole, Vec<&'static str>)> {
    let channels = config.channels.clone().unwrap_or_default();
    if let Some(role) = channels.role() {
        debug!(instance = %config.id, %role, "Channel bindings match role");
        return Ok(role);
    }

    let (role, missing) = channels.closest_role();
    warn!(
        instance = %config.id,
        closest = %role,
        missing = ?missing,
        "Channel bindings match no role"
    );
    Err((role, missing))
}
