//! HTTP + WebSocket server

pub mod handlers;
pub mod router;
pub mod websocket;


use std::sync::Arc;

use anyhow::Context;
use grove_core::{GraphEvent, SharedGraph, Snapshot};
use grove_enrich::Scheduler;
use tokio::net::TcpListener;
use tracing::info;

pub use router::create_router;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 7890 }
    }
}

/// Shared by every handler and socket.
pub struct ServerState {
    pub graph: SharedGraph,
    pub scheduler: Scheduler,
}

impl ServerState {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { graph: scheduler.graph().clone(), scheduler }
    }

    pub async fn snapshot(&self) -> Snapshot {
        Snapshot::from_graph(&*self.graph.read().await)
    }

    pub async fn full_snapshot_event(&self) -> GraphEvent {
        GraphEvent::FullSnapshot { snapshot: Box::new(self.snapshot().await) }
    }
}

pub struct GroveServer {
    state: Arc<ServerState>,
    config: ServerConfig,
}

impl GroveServer {
    pub fn new(scheduler: Scheduler, config: ServerConfig) -> Self {
        Self { state: Arc::new(ServerState::new(scheduler)), config }
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Bind the configured address and serve until the process stops.
    pub async fn start(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        self.serve_on(listener).await
    }

    pub async fn serve_on(self, listener: TcpListener) -> anyhow::Result<()> {
        info!("Grove server listening on http://{}", listener.local_addr()?);
        axum::serve(listener, create_router(self.state))
            .await
            .context("server error")
    }
}
