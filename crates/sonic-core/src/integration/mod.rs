//! Integration layer - collaborator interfaces.
//!
//! - Capability traits for fetching, environments, dependencies and plugins
//! - The host context bundling those capabilities
//! - The publish/subscribe broker contract

pub mod bus;
pub mod capability;

pub use bus::{BoxedSubscription, Broker, BusMessage, Subscription};

pub use capability::{
    ControlMessage, DependencyInstaller, EnvironmentBuilder, EnvironmentStatus, FetchRequest,
    HostContext, InstanceIdentity, PluginHost, PluginProcess, PluginStatus, ReplacePrompt,
    SourceFetcher, StaticPrompt, StatusSource,
};
