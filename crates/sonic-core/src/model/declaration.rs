//! Extension declarations and the replace policy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::extension::InstanceOverride;

fn default_copy_folder() -> bool {
    true
}

/// One entry of the top-level `extensions` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionDeclaration {
    /// Id of the default instance.
    pub id: String,

    /// Category the extension belongs to.
    pub category: String,

    /// VCS URL or filesystem path.
    pub source: String,

    /// Copy the source into the managed tree (`true`) or run in place.
    #[serde(default = "default_copy_folder")]
    pub copy_folder: bool,

    /// Branch to clone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Repository access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Per-instance overrides keyed by instance id.
    #[serde(default, rename = "override", skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, InstanceOverride>,
}

/// What to do when an instance directory already exists.
///
/// Deserialized from the `replace_existing` flag: `true`, `false` or `null`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum ReplacePolicy {
    /// Remove the existing managed copy and provision again.
    AlwaysReplace,
    /// Keep the existing directory.
    NeverReplace,
    /// Ask the host for each existing managed copy.
    #[default]
    AskInteractively,
}

impl From<Option<bool>> for ReplacePolicy {
    fn from(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Self::AlwaysReplace,
            Some(false) => Self::NeverReplace,
            None => Self::AskInteractively,
        }
    }
}

impl From<ReplacePolicy> for Option<bool> {
    fn from(policy: ReplacePolicy) -> Self {
        match policy {
            ReplacePolicy::AlwaysReplace => Some(true),
            ReplacePolicy::NeverReplace => Some(false),
            ReplacePolicy::AskInteractively => None,
        }
    }
}

impl ReplacePolicy {
    /// Describes the policy for the startup log.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::AlwaysReplace => "Will replace any existing extension with the same id.",
            Self::NeverReplace => "Will skip any existing extension with the same id.",
            Self::AskInteractively => "Will ask if an existing extension with the same id should be replaced.",
        }
    }
}

impl std::str::FromStr for ReplacePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always" | "true" => Ok(Self::AlwaysReplace),
            "never" | "false" => Ok(Self::NeverReplace),
            "ask" | "null" => Ok(Self::AskInteractively),
            other => Err(format!("unknown replace policy '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_defaults() {
        let declaration: ExtensionDeclaration = serde_json::from_str(
            r#"{"id": "vad", "category": "audio", "source": "https://example/vad.git"}"#,
        )
        .unwrap();
        assert!(declaration.copy_folder);
        assert!(declaration.overrides.is_empty());
        assert!(declaration.branch.is_none());
    }

    #[test]
    fn test_declaration_override_key() {
        let declaration: ExtensionDeclaration = serde_json::from_str(
            r#"{
                "id": "vad", "category": "audio", "source": "./vad",
                "override": {"vad2": {"branch": "dev"}}
            }"#,
        )
        .unwrap();
        assert_eq!(
            declaration.overrides["vad2"].branch.as_deref(),
            Some("dev")
        );
    }

    #[test]
    fn test_unknown_override_field_rejected() {
        let result: Result<ExtensionDeclaration, _> = serde_json::from_str(
            r#"{
                "id": "vad", "category": "audio", "source": "./vad",
                "override": {"vad2": {"colour": "red"}}
            }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_replace_policy_from_flag() {
        let policy: ReplacePolicy = serde_json::from_str("true").unwrap();
        assert_eq!(policy, ReplacePolicy::AlwaysReplace);
        let policy: ReplacePolicy = serde_json::from_str("false").unwrap();
        assert_eq!(policy, ReplacePolicy::NeverReplace);
        let policy: ReplacePolicy = serde_json::from_str("null").unwrap();
        assert_eq!(policy, ReplacePolicy::AskInteractively);
    }

    #[test]
    fn test_replace_policy_from_str() {
        assert_eq!(
            "Always".parse::<ReplacePolicy>(),
            Ok(ReplacePolicy::AlwaysReplace)
        );
        assert_eq!("never".parse::<ReplacePolicy>(), Ok(ReplacePolicy::NeverReplace));
        assert!("sometimes".parse::<ReplacePolicy>().is_err());
    }
}
