//! Status endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use sonic_core::{HostResult, PluginStatus, StatusSource};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

const HELP: &str = "Sonic extension orchestrator\n\n\
GET /         this help\n\
GET /status   JSON list of supervised extension instances\n";

/// Serves the plugin statuses of a [`StatusSource`] over HTTP.
pub struct StatusServer {
    source: Arc<dyn StatusSource>,
}

/// Handle of a running [`StatusServer`]; dropping it stops the server.
pub struct StatusHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl StatusHandle {
    /// The address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops the server and waits for it to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for StatusHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl StatusServer {
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        Self { source }
    }

    /// Builds the router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(help))
            .route("/status", get(status))
            .with_state(self.source.clone())
    }

    /// Binds `addr` and serves in a background task.
    pub async fn listen(&self, addr: &str) -> HostResult<StatusHandle> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_addr = listener.local_addr()?;
        info!(addr = %actual_addr, "Status server listening");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let router = self.router();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                error!(error = %e, "Status server error");
            }
            info!("Status server stopped");
        });

        Ok(StatusHandle {
            addr: actual_addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

async fn help() -> &'static str {
    HELP
}

async fn status(State(source): State<Arc<dyn StatusSource>>) -> Json<Vec<PluginStatus>> {
    Json(source.statuses().await)
}
