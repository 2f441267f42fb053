//! Files generated into a provisioned instance directory.

use std::path::Path;

use sonic_core::{BOOTSTRAP_FILE, ExtensionGlobalConfig, HostPlatform, PLUGIN_MANIFEST};

use crate::error::{ProvisionError, ProvisionResult};

/// Renders the package entry point.
///
/// The environment's site-packages directories are put in front of the
/// module search path before the extension's `main` module is imported.
pub fn bootstrap_script(site_packages: &[String; 2]) -> String {
    let [primary, wide] = site_packages;
    format!(
        r#"import os
import sys

_instance_dir = os.path.dirname(os.path.abspath(__file__))

sys.path.insert(0, os.path.join(_instance_dir, "{primary}"))
sys.path.insert(0, os.path.join(_instance_dir, "{wide}"))

from .main import *
"#
    )
}

/// Renders the plugin manifest.
///
/// Line breaks inside values are collapsed to single spaces.
pub fn plugin_manifest(config: &ExtensionGlobalConfig) -> String {
    let authors = config
        .authors
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    format!(
        "[Core]\nName = {name}\nModule = .\n\n[Documentation]\nAuthor = {authors}\nDescription = {description}\nVersion = {version}\n",
        name = single_line(config.display_name()),
        authors = single_line(&authors),
        description = single_line(config.description.as_deref().unwrap_or_default()),
        version = single_line(config.version.as_deref().unwrap_or_default()),
    )
}

fn single_line(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Writes the bootstrap module and plugin manifest into the instance
/// directory.
pub async fn write_artifacts(
    config: &ExtensionGlobalConfig,
    platform: HostPlatform,
    language_version: &str,
) -> ProvisionResult<()> {
    let bootstrap = bootstrap_script(&platform.site_packages(language_version));
    write(&config.path.join(BOOTSTRAP_FILE), bootstrap).await?;
    write(&config.path.join(PLUGIN_MANIFEST), plugin_manifest(config)).await
}

async fn write(path: &Path, contents: String) -> ProvisionResult<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| ProvisionError::Artifact {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_core::{Authors, ExtensionDeclaration};

    fn config(path: &Path) -> ExtensionGlobalConfig {
        let declaration = ExtensionDeclaration {
            id: "vad".to_string(),
            category: "audio".to_string(),
            source: "./vad".to_string(),
            copy_folder: true,
            branch: None,
            token: None,
            overrides: Default::default(),
        };
        let mut config = ExtensionGlobalConfig::from_declaration(&declaration);
        config.path = path.to_path_buf();
        config
    }

    #[test]
    fn test_bootstrap_linux_order() {
        let script = bootstrap_script(&HostPlatform::Linux.site_packages("3.10"));
        let primary = script
            .find(".venv/lib/python3.10/site-packages")
            .unwrap();
        let wide = script
            .find(".venv/lib64/python3.10/site-packages")
            .unwrap();
        let import = script.find("from .main import *").unwrap();
        assert!(primary < wide);
        assert!(wide < import);
    }

    #[test]
    fn test_bootstrap_windows() {
        let script = bootstrap_script(&HostPlatform::Windows.site_packages("3.10"));
        assert_eq!(script.matches(".venv/Lib/site-packages").count(), 2);
    }

    #[test]
    fn test_manifest_contents() {
        let mut config = config(Path::new("ext"));
        config.name = Some("Voice Activity".to_string());
        config.version = Some("1.2.0".to_string());
        config.authors = Some(Authors::Many(vec!["a".to_string(), "b".to_string()]));

        let manifest = plugin_manifest(&config);
        assert!(manifest.starts_with("[Core]\nName = Voice Activity\nModule = .\n"));
        assert!(manifest.contains("[Documentation]\nAuthor = a, b\n"));
        assert!(manifest.contains("Description = \n"));
        assert!(manifest.contains("Version = 1.2.0\n"));
    }

    #[test]
    fn test_manifest_values_stay_on_one_line() {
        let mut config = config(Path::new("ext"));
        config.name = Some("VAD\r[Core]".to_string());
        config.description = Some("Detects speech.\n\nModule = evil\n".to_string());
        config.version = Some("1.0\n".to_string());
        config.authors = Some(Authors::One("alice\nbob".to_string()));

        let manifest = plugin_manifest(&config);
        assert_eq!(
            manifest.lines().collect::<Vec<_>>(),
            [
                "[Core]",
                "Name = VAD [Core]",
                "Module = .",
                "",
                "[Documentation]",
                "Author = alice bob",
                "Description = Detects speech. Module = evil",
                "Version = 1.0",
            ]
        );
    }

    #[test]
    fn test_manifest_name_falls_back_to_id() {
        let manifest = plugin_manifest(&config(Path::new("ext")));
        assert!(manifest.contains("Name = vad\n"));
    }

    #[tokio::test]
    async fn test_write_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        write_artifacts(&config, HostPlatform::Linux, "3.11")
            .await
            .unwrap();
        assert!(dir.path().join(BOOTSTRAP_FILE).is_file());
        assert!(dir.path().join(PLUGIN_MANIFEST).is_file());
    }

    #[tokio::test]
    async fn test_write_artifacts_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir.path().join("absent"));
        let result = write_artifacts(&config, HostPlatform::Linux, "3.11").await;
        assert!(matches!(result, Err(ProvisionError::Artifact { .. })));
    }
}
