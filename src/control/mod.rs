//! JSON control API over the import orchestrator.

mod handlers;

use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::importer::GameImporter;

/// Control API state
#[derive(Clone)]
pub struct ControlServer {
    pub importer: Arc<GameImporter>,
    pub listen_addr: String,
}

impl ControlServer {
    pub fn new(importer: Arc<GameImporter>, listen_addr: &str) -> Self {
        Self {
            importer,
            listen_addr: listen_addr.to_string(),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/status", get(handlers::status))
            .route("/api/import", post(handlers::import))
            .route("/api/reset", post(handlers::reset))
            .route("/api/game_info", get(handlers::game_info))
            .route("/api/launch/start", post(handlers::launch_start))
            .route("/api/launch/stop", post(handlers::launch_stop))
            .route("/api/launch/console", get(handlers::launch_console))
            .route("/game/*path", get(handlers::game_file))
            .with_state(self.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn start(self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!("Control API starting on {}", self.listen_addr);
        let router = self.router();

        let listener = tokio::net::TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("Control API listening on http://{}", listener.local_addr()?);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        tracing::info!("Control API stopped");
        Ok(())
    }
}
