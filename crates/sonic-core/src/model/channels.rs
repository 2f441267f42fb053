//! Channel bindings between an instance and the message bus.
//!
//! Every extension uses the same [`ChannelsPipeline`] shape. What differs
//! between a producer, a consumer/producer and a consumer is which fields are
//! filled in; [`ChannelRole`] checks a pipeline against those profiles.

use serde::{Deserialize, Serialize};

use super::overlay::{Overlay, overlay_nested, overlay_value};

/// Logical input sources feeding an extension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelInput {
    /// File paths to read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,

    /// Network interface names to capture from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interfaces: Option<Vec<String>>,
}

impl Overlay for ChannelInput {
    fn overlay(&mut self, top: &Self) {
        overlay_value(&mut self.files, &top.files);
        overlay_value(&mut self.interfaces, &top.interfaces);
    }
}

/// Binding of input sources and bus channels for one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelsPipeline {
    /// Input sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<ChannelInput>,

    /// Bus channels to subscribe to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<Vec<String>>,

    /// Bus channels to publish into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<Vec<String>>,
}

impl Overlay for ChannelsPipeline {
    fn overlay(&mut self, top: &Self) {
        overlay_nested(&mut self.input, &top.input);
        overlay_value(&mut self.subscribe, &top.subscribe);
        overlay_value(&mut self.publish, &top.publish);
    }
}

impl ChannelsPipeline {
    /// Returns the subscribed channel names, or an empty slice.
    pub fn subscriptions(&self) -> &[String] {
        self.subscribe.as_deref().unwrap_or_default()
    }

    /// Returns the publish channel names, or an empty slice.
    pub fn publications(&self) -> &[String] {
        self.publish.as_deref().unwrap_or_default()
    }

    /// Infers the role this pipeline satisfies, most specific first.
    pub fn role(&self) -> Option<ChannelRole> {
        ChannelRole::ALL
            .into_iter()
            .find(|role| role.missing_fields(self).is_empty())
    }

    /// Returns the role with the fewest unset required fields, and those
    /// fields. Ties go to the more specific role.
    pub fn closest_role(&self) -> (ChannelRole, Vec<&'static str>) {
        ChannelRole::ALL
            .into_iter()
            .map(|role| (role, role.missing_fields(self)))
            .min_by_key(|(_, missing)| missing.len())
            .unwrap_or((ChannelRole::Reporting, vec!["subscribe"]))
    }
}

/// Validation profile over [`ChannelsPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// Producer: reads inputs and publishes.
    Feature,
    /// Consumer/producer: subscribes and publishes.
    Inference,
    /// Consumer only.
    Reporting,
}

impl ChannelRole {
    /// Every role, most specific first.
    pub const ALL: [ChannelRole; 3] = [Self::Feature, Self::Inference, Self::Reporting];

    /// Returns the role name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Inference => "inference",
            Self::Reporting => "reporting",
        }
    }

    /// Lists the fields this role requires that `pipeline` leaves unset.
    pub fn missing_fields(&self, pipeline: &ChannelsPipeline) -> Vec<&'static str> {
        let required: &[(&'static str, bool)] = match self {
            Self::Feature => &[
                ("input", pipeline.input.is_some()),
                ("publish", pipeline.publish.is_some()),
            ],
            Self::Inference => &[
                ("subscribe", pipeline.subscribe.is_some()),
                ("publish", pipeline.publish.is_some()),
            ],
            Self::Reporting => &[("subscribe", pipeline.subscribe.is_some())],
        };
        required
            .iter()
            .filter(|(_, present)| !present)
            .map(|(name, _)| *name)
            .collect()
    }
}

impl std::fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
