//! # Sonic Core
//!
//! Shared building blocks of the Sonic extension orchestrator.
//!
//! ## Layers
//!
//! ### Model
//!
//! Declarative configuration and its resolved form:
//! - **Declarations**: one entry per extension plus per-instance overrides ([`ExtensionDeclaration`])
//! - **Instances**: fully resolved instance configuration ([`ExtensionGlobalConfig`])
//! - **Partials**: optional-field overrides and local configs ([`InstanceOverride`])
//! - **Channels**: bus bindings and role profiles ([`ChannelsPipeline`], [`ChannelRole`])
//!
//! ### Integration
//!
//! Collaborator interfaces the orchestration core is written against:
//! - **Capabilities**: fetch, environment, dependencies, plugins ([`HostContext`])
//! - **Bus**: publish/subscribe broker with a key-value store ([`Broker`])
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌────────────┐
//! │ Declaration  │────▶│  Instances  │────▶│ Supervisor │
//! │   (config)   │     │ (provision) │     │ (plugins)  │
//! └──────────────┘     └─────────────┘     └────────────┘
//!                             │                   │
//!                             ▼                   ▼
//!                       HostContext          PluginHost
//! ```

pub mod error;
pub mod integration;
pub mod lifecycle;
pub mod model;
pub mod platform;

pub use error::{BusError, BusResult, HostError, HostResult};

pub use integration::{
    BoxedSubscription, Broker, BusMessage, ControlMessage, DependencyInstaller,
    EnvironmentBuilder, EnvironmentStatus, FetchRequest, HostContext, InstanceIdentity,
    PluginHost, PluginProcess, PluginStatus, ReplacePrompt, SourceFetcher, StaticPrompt,
    StatusSource, Subscription,
};

pub use lifecycle::Lifecycle;

pub use model::{
    Authors, CategoryInfo, ChannelInput, ChannelRole, ChannelsPipeline, DEFAULT_REQUIREMENTS,
    ExtensionDeclaration, ExtensionGlobalConfig, ExtensionLogLevel, InstanceOverride,
    LogOptions, Overlay, ProvisioningState, ReplacePolicy,
};

pub use platform::{BOOTSTRAP_FILE, ENVIRONMENT_DIR, HostPlatform, PLUGIN_MANIFEST};

/// Prelude for common imports.
pub mod prelude {
    pub use super::integration::*;
    pub use super::model::{
        ExtensionDeclaration, ExtensionGlobalConfig, InstanceOverride, ProvisioningState,
        ReplacePolicy,
    };
    pub use super::{HostError, HostResult, Lifecycle};
}
