//! Resolved instance configuration and its partial form.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::channels::ChannelsPipeline;
use super::declaration::ExtensionDeclaration;
use super::overlay::{
    Overlay, overlay_json, overlay_nested, overlay_value, underlay_json, underlay_nested,
    underlay_value,
};

/// Default dependency manifest file name.
pub const DEFAULT_REQUIREMENTS: &str = "requirements.txt";

// =============================================================================
// Log options
// =============================================================================

/// Log level handed to an extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExtensionLogLevel {
    Critical,
    Error,
    Warning,
    Info,
    #[default]
    Debug,
}

/// Log options handed to an extension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogOptions {
    /// Log level (defaults to `DEBUG`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<ExtensionLogLevel>,

    /// Directory for log files (defaults to `./logs`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl LogOptions {
    /// Returns a copy with every unset field given its default.
    pub fn with_defaults(&self) -> Self {
        Self {
            level: Some(self.level.unwrap_or_default()),
            dir: Some(self.dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))),
        }
    }
}

impl Overlay for LogOptions {
    fn overlay(&mut self, top: &Self) {
        overlay_value(&mut self.level, &top.level);
        overlay_value(&mut self.dir, &top.dir);
    }
}

// =============================================================================
// Authors
// =============================================================================

/// One author or a list of authors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Authors {
    One(String),
    Many(Vec<String>),
}

impl std::fmt::Display for Authors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::One(author) => write!(f, "{author}"),
            Self::Many(authors) => write!(f, "{}", authors.join(", ")),
        }
    }
}

// =============================================================================
// InstanceOverride
// =============================================================================

/// A partially specified instance configuration.
///
/// Used for the entries of a declaration's `override` map and for the
/// `config.yaml` an extension ships with. Only fields that are `Some` take
/// part in a merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceOverride {
    /// Ignored during expansion; the override map key is authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_folder: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Ignored; the path is always derived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Authors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<ChannelsPipeline>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<Map<String, Value>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
}

// =============================================================================
// ExtensionGlobalConfig
// =============================================================================

/// The fully resolved configuration of one extension instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionGlobalConfig {
    /// Instance id, unique within its declaration.
    pub id: String,
    /// Category the instance belongs to.
    pub category: String,
    /// VCS URL or filesystem path of the extension source.
    pub source: String,
    /// Copy the source into the managed tree (`true`) or run in place.
    pub copy_folder: bool,
    /// Branch to clone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Access token for the repository. Never handed to the extension.
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    /// Working directory of the instance.
    pub path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Authors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Dependency manifest, relative to `path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<ChannelsPipeline>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<Map<String, Value>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
}

impl ExtensionGlobalConfig {
    /// Builds the default instance of a declaration.
    ///
    /// The path is left empty until the expander resolves it.
    pub fn from_declaration(declaration: &ExtensionDeclaration) -> Self {
        Self {
            id: declaration.id.clone(),
            category: declaration.category.clone(),
            source: declaration.source.clone(),
            copy_folder: declaration.copy_folder,
            branch: declaration.branch.clone(),
            token: declaration.token.clone(),
            path: PathBuf::new(),
            name: None,
            description: None,
            version: None,
            authors: None,
            license: None,
            requirements: None,
            channels: None,
            log: None,
            models: None,
            options: None,
        }
    }

    /// Applies an override: every field it sets replaces the current value.
    ///
    /// `id` and `path` are never taken from the override.
    pub fn apply(&mut self, patch: &InstanceOverride) {
        if let Some(category) = &patch.category {
            self.category.clone_from(category);
        }
        if let Some(source) = &patch.source {
            self.source.clone_from(source);
        }
        if let Some(copy_folder) = patch.copy_folder {
            self.copy_folder = copy_folder;
        }
        overlay_value(&mut self.branch, &patch.branch);
        overlay_value(&mut self.token, &patch.token);
        overlay_value(&mut self.name, &patch.name);
        overlay_value(&mut self.description, &patch.description);
        overlay_value(&mut self.version, &patch.version);
        overlay_value(&mut self.authors, &patch.authors);
        overlay_value(&mut self.license, &patch.license);
        overlay_value(&mut self.requirements, &patch.requirements);
        overlay_nested(&mut self.channels, &patch.channels);
        overlay_nested(&mut self.log, &patch.log);
        overlay_value(&mut self.models, &patch.models);
        match (self.options.as_mut(), &patch.options) {
            (Some(options), Some(patch)) => overlay_json(options, patch),
            (None, Some(patch)) => self.options = Some(patch.clone()),
            _ => {}
        }
    }

    /// Fills every unset field from `local`; fields already set are kept.
    ///
    /// Identity, source and path always keep their current values.
    pub fn fill_from(&mut self, local: &InstanceOverride) {
        underlay_value(&mut self.branch, &local.branch);
        underlay_value(&mut self.token, &local.token);
        underlay_value(&mut self.name, &local.name);
        underlay_value(&mut self.description, &local.description);
        underlay_value(&mut self.version, &local.version);
        underlay_value(&mut self.authors, &local.authors);
        underlay_value(&mut self.license, &local.license);
        underlay_value(&mut self.requirements, &local.requirements);
        underlay_nested(&mut self.channels, &local.channels);
        underlay_nested(&mut self.log, &local.log);
        underlay_value(&mut self.models, &local.models);
        underlay_json(&mut self.options, &local.options);
    }

    /// Returns the dependency manifest path inside the instance directory.
    pub fn requirements_path(&self) -> PathBuf {
        self.path
            .join(self.requirements.as_deref().unwrap_or(DEFAULT_REQUIREMENTS))
    }

    /// Returns the display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Returns whether the instance runs from its source location.
    pub fn runs_in_place(&self) -> bool {
        !self.copy_folder
    }

    /// Returns a copy with log defaults and an options map filled in, as
    /// delivered to the running extension.
    pub fn effective(&self) -> Self {
        let mut config = self.clone();
        config.log = Some(config.log.unwrap_or_default().with_defaults());
        config.options.get_or_insert_with(Map::new);
        config
    }
}
