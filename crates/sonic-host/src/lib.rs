//! # Sonic Host
//!
//! Default implementations of the collaborator traits defined in
//! `sonic-core`.
//!
//! ## Features
//!
//! - `http-server`: status endpoint ([`http::StatusServer`])
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  sonic-runtime      │  (provisioner, supervisor, engine)
//! ├─────────────────────┤
//! │  sonic-core         │  (capability traits, HostContext)
//! ├─────────────────────┤
//! │  sonic-host         │  <- This crate (implementations)
//! ├─────────────────────┤
//! │  git / python / OS  │
//! └─────────────────────┘
//! ```
//!
//! | Capability | Implementation |
//! |------------|----------------|
//! | `SourceFetcher` | [`GitFetcher`] |
//! | `EnvironmentBuilder` | [`VirtualenvBuilder`] |
//! | `DependencyInstaller` | [`PipInstaller`] |
//! | `PluginHost` | [`ProcessPluginHost`] |
//! | `ReplacePrompt` | [`ConsolePrompt`] |
//! | `Broker` | [`RedisBroker`], [`MemoryBroker`] |

use std::sync::Arc;

use sonic_core::{HostContext, HostResult};
use tracing::debug;

mod command;

pub mod broker;
pub mod git;
pub mod process;
pub mod prompt;
pub mod redis_broker;
pub mod venv;

#[cfg(feature = "http-server")]
pub mod http;

pub use broker::MemoryBroker;
pub use git::GitFetcher;
pub use process::{ProcessPlugin, ProcessPluginHost};
pub use prompt::{ConsolePrompt, LinePrompt};
pub use redis_broker::RedisBroker;
pub use venv::{PipInstaller, VirtualenvBuilder};

#[cfg(feature = "http-server")]
pub use http::{StatusHandle, StatusServer};

/// Creates a context with every default collaborator registered and a
/// [`RedisBroker`] for `broker_url`.
///
/// Does not connect to the broker. Fails on platforms without a known
/// environment layout or when the URL cannot be parsed.
pub fn default_context(broker_url: &str) -> HostResult<HostContext> {
    let broker = RedisBroker::open(broker_url)?;
    let ctx = collaborators()?.with_broker(Arc::new(broker));
    debug!("Registered default host collaborators");
    Ok(ctx)
}

/// Like [`default_context`], with an in-process [`MemoryBroker`].
///
/// Extensions running as separate processes cannot reach this broker.
pub fn in_memory_context() -> HostResult<HostContext> {
    let ctx = collaborators()?.with_broker(Arc::new(MemoryBroker::new()));
    debug!("Registered host collaborators with in-memory broker");
    Ok(ctx)
}

fn collaborators() -> HostResult<HostContext> {
    let plugin_host = ProcessPluginHost::new()?;
    Ok(HostContext::new()
        .with_fetcher(Arc::new(GitFetcher::new()))
        .with_environment(Arc::new(VirtualenvBuilder::new()))
        .with_installer(Arc::new(PipInstaller::new()))
        .with_plugin_host(Arc::new(plugin_host))
        .with_prompt(Arc::new(ConsolePrompt::stdin())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_core::Broker;

    #[cfg(any(target_os = "linux", target_os = "windows"))]
    #[tokio::test]
    async fn test_default_context_is_complete() {
        let ctx = default_context("redis://127.0.0.1:6379/").unwrap();
        assert!(ctx.fetcher().is_ok());
        assert!(ctx.environment().is_ok());
        assert!(ctx.installer().is_ok());
        assert!(ctx.plugin_host().is_ok());
        assert!(ctx.has_prompt());
        assert!(ctx.has_broker());
    }

    #[cfg(any(target_os = "linux", target_os = "windows"))]
    #[tokio::test]
    async fn test_in_memory_context_broker_answers() {
        let ctx = in_memory_context().unwrap();
        let broker = ctx.broker().unwrap();
        assert!(broker.ping().await.is_ok());
    }

    #[test]
    fn test_default_context_rejects_bad_broker_url() {
        assert!(matches!(
            default_context("not a url"),
            Err(sonic_core::HostError::Broker(_))
        ));
    }
}
