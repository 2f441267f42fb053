//! Sonic command line entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use sonic_core::ReplacePolicy;
use sonic_runtime::config::{BrokerBackend, ConfigLoader, validate_config};
use sonic_runtime::{Engine, wait_for_shutdown};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "sonic", version, about = "Provision and supervise sonic extensions")]
struct Cli {
    /// Configuration file (defaults to sonic.yaml in the current or user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, loaded from sonic.<profile>.yaml
    #[arg(short, long)]
    profile: Option<String>,

    /// What to do with existing extension folders: always, never or ask
    #[arg(long)]
    replace: Option<ReplacePolicy>,

    /// Serve the status endpoint on this address
    #[arg(long)]
    status_addr: Option<String>,

    /// Ignore SONIC_* environment variables
    #[arg(long)]
    no_env: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{e:#}");
        eprintln!("sonic: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut loader = ConfigLoader::new().with_current_dir().with_user_config_dir();
    if let Some(path) = &cli.config {
        loader = loader.file(path);
    }
    if let Some(profile) = &cli.profile {
        loader = loader.profile(profile.clone());
    }
    if cli.no_env {
        loader = loader.without_env();
    }

    let mut config = loader.load().context("failed to load configuration")?;
    if let Some(policy) = cli.replace {
        config.metadata.replace_existing = policy;
    }
    if let Some(addr) = cli.status_addr {
        config.status.enabled = true;
        config.status.addr = addr;
    }
    validate_config(&config).context("invalid configuration")?;

    let ctx = match config.broker.backend {
        BrokerBackend::Redis => sonic_host::default_context(&config.broker.url),
        BrokerBackend::Memory => sonic_host::in_memory_context(),
    }
    .context("failed to set up host collaborators")?;
    let engine = Engine::from_config(config, ctx);

    let supervisor = engine.start().await?;

    #[cfg(feature = "http-server")]
    let status = if engine.config().status.enabled {
        let source: std::sync::Arc<dyn sonic_core::StatusSource> = supervisor.clone();
        let server = sonic_host::StatusServer::new(source);
        let handle = server
            .listen(&engine.config().status.addr)
            .await
            .map_err(|e| sonic_runtime::EngineError::Status(e.to_string()));
        match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                supervisor.shutdown_all().await;
                return Err(e.into());
            }
        }
    } else {
        None
    };

    #[cfg(not(feature = "http-server"))]
    if engine.config().status.enabled {
        tracing::warn!("Status endpoint requested but built without the http-server feature");
    }

    info!("Sonic engine is now running. Press Ctrl+C to stop.");
    engine.supervise(&supervisor, wait_for_shutdown()).await;

    #[cfg(feature = "http-server")]
    if let Some(handle) = status {
        handle.stop().await;
    }

    Ok(())
}
