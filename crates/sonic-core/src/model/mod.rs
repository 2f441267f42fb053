//! Configuration data model.
//!
//! - [`ExtensionDeclaration`]: one entry of the `extensions` list
//! - [`ExtensionGlobalConfig`]: a fully resolved instance
//! - [`InstanceOverride`]: a partially specified instance
//! - [`ChannelsPipeline`]: bus bindings
//! - [`ProvisioningState`]: where an instance is in provisioning

mod channels;
mod declaration;
mod extension;
mod overlay;

pub use channels::{ChannelInput, ChannelRole, ChannelsPipeline};
pub use declaration::{ExtensionDeclaration, ReplacePolicy};
pub use extension::{
    Authors, DEFAULT_REQUIREMENTS, ExtensionGlobalConfig, ExtensionLogLevel, InstanceOverride,
    LogOptions,
};
pub use overlay::{Overlay, overlay_json};

use serde::{Deserialize, Serialize};

/// Provisioning progress of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    Resolved,
    Skipped,
    Fetched,
    LocallyMerged,
    Environed,
    DependenciesInstalled,
    ArtifactsWritten,
    Ready,
}

impl ProvisioningState {
    /// Returns whether provisioning has finished for this instance.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Skipped | Self::Ready)
    }
}

impl std::fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Resolved => "resolved",
            Self::Skipped => "skipped",
            Self::Fetched => "fetched",
            Self::LocallyMerged => "locally_merged",
            Self::Environed => "environed",
            Self::DependenciesInstalled => "dependencies_installed",
            Self::ArtifactsWritten => "artifacts_written",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Category of extensions, listed for documentation and status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInfo {
    /// Category name, matching `ExtensionDeclaration::category`.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
