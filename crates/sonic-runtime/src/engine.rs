//! Engine orchestration: provisioning followed by supervision.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sonic_runtime::Engine;
//!
//! let engine = Engine::builder()
//!     .config_file("sonic.yaml")
//!     .context(host_context)
//!     .build()?;
//!
//! engine.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use sonic_core::{BusError, HostContext, Lifecycle, ProvisioningState};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::BusClient;
use crate::config::{AppConfig, ConfigLoader, ConfigResult, validate_config};
use crate::error::{EngineError, EngineResult};
use crate::expander;
use crate::logging;
use crate::provisioner::{ProvisionedInstance, Provisioner};
use crate::supervisor::PluginSupervisor;

/// Provisions the declared extensions and supervises them until they all
/// exit or a shutdown is requested.
pub struct Engine {
    config: AppConfig,
    ctx: HostContext,
    lifecycle: Lifecycle,
    shutdown: CancellationToken,
}

impl Engine {
    /// Creates an engine builder.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Creates an engine from configuration and host collaborators.
    ///
    /// Initializes logging from the configuration unless a subscriber is
    /// already installed.
    pub fn from_config(config: AppConfig, ctx: HostContext) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            log_level = %config.logging.level,
            extensions = config.extensions.len(),
            "Engine initialized from configuration"
        );

        Self {
            config,
            ctx,
            lifecycle: Lifecycle::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn context(&self) -> &HostContext {
        &self.ctx
    }

    /// Returns the process lifecycle flag shared with bus listeners.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Returns a token that stops the host loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Connects a bus client to the registered broker.
    pub async fn bus_client(&self) -> EngineResult<BusClient> {
        let broker = self
            .ctx
            .broker()
            .cloned()
            .ok_or_else(|| {
                EngineError::BrokerUnavailable(BusError::Unavailable(
                    "no broker registered".to_string(),
                ))
            })?;
        BusClient::connect(broker, self.lifecycle.clone())
            .await
            .map_err(|e| {
                error!(error = %e, "Message broker is NOT running");
                EngineError::BrokerUnavailable(e)
            })
    }

    /// Expands and provisions every declared extension, in declaration
    /// order.
    ///
    /// Per-instance failures are logged and the instance is left out. The
    /// first fatal failure stops provisioning.
    pub async fn provision_all(&self) -> EngineResult<Vec<ProvisionedInstance>> {
        validate_config(&self.config)?;

        let policy = self.config.metadata.replace_existing;
        let root: &Path = &self.config.metadata.extensions_folder;
        let provisioner = Provisioner::new(self.ctx.clone()).map_err(EngineError::Fatal)?;

        let mut provisioned = Vec::new();
        for declaration in &self.config.extensions {
            for instance in expander::expand(declaration, root)? {
                let id = instance.id.clone();
                match provisioner.provision(instance, policy).await {
                    Ok(result) => provisioned.push(result),
                    Err(e) if e.is_fatal() => {
                        error!(instance = %id, error = %e, "Fatal provisioning error");
                        return Err(EngineError::Fatal(e));
                    }
                    Err(e) => {
                        error!(instance = %id, error = %e, "Failed to provision extension instance");
                    }
                }
            }
        }

        let ready = provisioned
            .iter()
            .filter(|p| p.state == ProvisioningState::Ready)
            .count();
        info!(
            ready,
            skipped = provisioned.len() - ready,
            "Provisioning finished"
        );
        Ok(provisioned)
    }

    /// Checks the broker, provisions all instances and activates them.
    pub async fn start(&self) -> EngineResult<Arc<PluginSupervisor>> {
        self.bus_client().await?;
        info!("{}", self.config.metadata.replace_existing.describe());

        let provisioned = self.provision_all().await?;
        let configs = provisioned.into_iter().map(|p| p.config).collect();

        let supervisor = Arc::new(PluginSupervisor::new(
            self.ctx.clone(),
            &self.config.metadata.extensions_folder,
            configs,
        ));
        supervisor.discover().await?;
        supervisor.activate_all().await;

        Ok(supervisor)
    }

    /// Polls liveness until no plugin is alive, `shutdown` resolves or the
    /// shutdown token is cancelled, then shuts every plugin down.
    pub async fn supervise<F>(&self, supervisor: &PluginSupervisor, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.config.metadata.poll_interval());

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Exiting the program.");
                    break;
                }
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    let alive = supervisor.count_alive();
                    debug!(alive, "Liveness poll");
                    if alive == 0 {
                        info!("No extension is running");
                        break;
                    }
                }
            }
        }

        supervisor.shutdown_all().await;
        self.lifecycle.stop();
    }

    /// Runs the engine until a shutdown signal is received.
    pub async fn run(&self) -> EngineResult<()> {
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs the engine with a custom shutdown future.
    pub async fn run_until<F>(&self, shutdown: F) -> EngineResult<()>
    where
        F: Future<Output = ()>,
    {
        let supervisor = self.start().await?;
        info!("Sonic engine is now running. Press Ctrl+C to stop.");
        self.supervise(&supervisor, shutdown).await;
        Ok(())
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c() => {
                        info!("Received Ctrl+C, shutting down");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                ctrl_c().await;
                info!("Received Ctrl+C, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
        info!("Received Ctrl+C, shutting down");
    }
}

async fn ctrl_c() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

// =============================================================================
// EngineBuilder
// =============================================================================

/// Builder for creating an [`Engine`] with custom configuration.
pub struct EngineBuilder {
    config_loader: ConfigLoader,
    ctx: HostContext,
}

impl EngineBuilder {
    /// Creates a new builder searching the current and user config
    /// directories.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new()
                .with_current_dir()
                .with_user_config_dir(),
            ctx: HostContext::new(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: AppConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Sets the host collaborators.
    pub fn context(mut self, ctx: HostContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Loads, validates and builds the engine.
    pub fn build(self) -> ConfigResult<Engine> {
        let config = self.config_loader.load()?;
        validate_config(&config)?;
        Ok(Engine::from_config(config, self.ctx))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
