//! # Sonic
//!
//! Provisions, configures and supervises independently running extension
//! processes from declarative configuration, and gives them a shared
//! publish/subscribe bus.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌─────────────┐     ┌────────────┐
//! │ sonic.yaml   │────▶│  Expander   │────▶│ Provisioner │────▶│ Supervisor │──▶ extension processes
//! │ declarations │     │ (instances) │     │ (per inst.) │     │ (liveness) │
//! └──────────────┘     └─────────────┘     └─────────────┘     └────────────┘
//! ```
//!
//! - **Expander**: one declaration plus overrides into resolved instances
//! - **Provisioner**: fetch or copy, local config merge, environment,
//!   dependencies, generated bootstrap and manifest
//! - **Supervisor**: activation, configuration delivery, liveness, shutdown
//! - **Bus client**: fan-in of subscribed channels
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sonic::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = Engine::builder()
//!         .config_file("sonic.yaml")
//!         .context(sonic::host::default_context("redis://127.0.0.1:6379/")?)
//!         .build()?;
//!
//!     engine.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `http-server`: status endpoint (default)
//! - `toml-config`: TOML configuration files
//! - `json-log`: JSON log output

pub use sonic_core as core;
pub use sonic_host as host;
pub use sonic_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use sonic::prelude::*;
/// ```
pub mod prelude {
    // Engine - main entry point
    pub use sonic_runtime::{Engine, EngineBuilder, EngineError};

    // Configuration
    pub use sonic_runtime::config::{AppConfig, ConfigLoader};

    // Building blocks
    pub use sonic_runtime::{BusClient, PluginSupervisor, Provisioner};

    // Model and collaborators
    pub use sonic_core::prelude::*;
}
