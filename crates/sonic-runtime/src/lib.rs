//! Sonic Runtime - Orchestration layer for the Sonic extension orchestrator.
//!
//! This crate provides:
//! - Layered configuration loading and validation (`config`)
//! - Expansion of declarations into instances (`expander`)
//! - Local configuration merging (`merger`)
//! - The instance provisioning state machine (`Provisioner`)
//! - Plugin supervision (`PluginSupervisor`)
//! - The message bus client (`BusClient`)
//! - The engine host loop (`Engine`)
//! - Logging configuration
//!
//! The runtime only talks to the outside world through the collaborators
//! registered in a [`sonic_core::HostContext`].
//!
//! ```ignore
//! use sonic_runtime::Engine;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = Engine::builder()
//!         .profile("production")
//!         .context(host_context)
//!         .build()?;
//!
//!     // Provision, activate and supervise until Ctrl+C
//!     engine.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod artifacts;
pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod expander;
pub mod logging;
pub mod merger;
pub mod provisioner;
pub mod supervisor;

#[cfg(test)]
mod testing;

// Re-exports
pub use bus::{BusClient, Deliveries, Delivery};
pub use config::{AppConfig, ConfigError, ConfigLoader, ConfigResult};
pub use engine::{Engine, EngineBuilder, wait_for_shutdown};
pub use error::{EngineError, EngineResult, ProvisionError, ProvisionResult, SupervisorError};
pub use logging::{LoggingBuilder, SpanEvents};
pub use provisioner::{ProvisionedInstance, Provisioner};
pub use supervisor::{PluginHandle, PluginSupervisor};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
