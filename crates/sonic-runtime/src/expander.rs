//! Expansion of an extension declaration into its instances.
//!
//! A declaration always yields one default instance. Every `override` entry
//! either patches that default (when keyed by the declaration's own id) or
//! adds a sibling instance with the entry's key as id. Siblings start from
//! the unpatched declaration values.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use sonic_core::{ExtensionDeclaration, ExtensionGlobalConfig};
use tracing::trace;

use crate::config::{ConfigError, ConfigResult};

/// Expands `declaration` into resolved instance configurations.
///
/// Managed instances live at `extensions_root/<category>/<id>`; in-place
/// instances use their source as path.
pub fn expand(
    declaration: &ExtensionDeclaration,
    extensions_root: &Path,
) -> ConfigResult<Vec<ExtensionGlobalConfig>> {
    let template = ExtensionGlobalConfig::from_declaration(declaration);
    let mut default = template.clone();
    let mut siblings = Vec::new();

    for (key, patch) in &declaration.overrides {
        if key.trim().is_empty() {
            return Err(ConfigError::malformed_override(
                &declaration.id,
                "override key must not be empty",
            ));
        }

        if key == &declaration.id {
            default.apply(patch);
        } else {
            let mut sibling = template.clone();
            sibling.id.clone_from(key);
            sibling.apply(patch);
            siblings.push(sibling);
        }
    }

    let mut instances = Vec::with_capacity(siblings.len() + 1);
    instances.push(default);
    instances.extend(siblings);

    let mut seen = HashSet::new();
    for instance in &mut instances {
        if !seen.insert(instance.id.clone()) {
            return Err(ConfigError::DuplicateInstanceId {
                extension: declaration.id.clone(),
                id: instance.id.clone(),
            });
        }
        instance.path = resolve_path(instance, extensions_root);
        trace!(
            instance = %instance.id,
            path = %instance.path.display(),
            "Resolved instance"
        );
    }

    Ok(instances)
}

/// Returns the working directory of an instance.
pub fn resolve_path(instance: &ExtensionGlobalConfig, extensions_root: &Path) -> PathBuf {
    if instance.copy_folder {
        extensions_root.join(&instance.category).join(&instance.id)
    } else {
        PathBuf::from(&instance.source)
    }
}
