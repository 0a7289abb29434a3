//! `EnsembleServer` — axum HTTP + WebSocket server assembly.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use ensemble_runtime::orchestrator::Orchestrator;
use ensemble_runtime::store::RunStore;

use crate::config::ServerConfig;
use crate::http::{self, AppState};
use crate::rooms::RoomRegistry;

/// The assembled server: configuration plus shared state.
pub struct EnsembleServer {
    config: ServerConfig,
    state: AppState,
}

impl EnsembleServer {
    /// Wire the server around already-constructed collaborators.
    pub fn new(
        config: ServerConfig,
        orchestrator: Arc<Orchestrator>,
        rooms: Arc<RoomRegistry>,
        store: Arc<RunStore>,
    ) -> Self {
        let state = AppState {
            orchestrator,
            rooms,
            store,
            connections: Arc::new(AtomicUsize::new(0)),
            start_time: Instant::now(),
            config: config.clone(),
        };
        Self { config, state }
    }

    /// Build the router with all routes.
    #[must_use]
    pub fn router(&self) -> Router {
        http::router(self.state.clone())
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind and serve until the shutdown token cancels.
    pub async fn serve(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local = listener.local_addr()?;
        info!(%local, "listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
    }
}
