use std::path::Path;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::handlers::{healthz, invoke, list_functions};
use crate::metrics::{metrics_handler, stats_handler, track_requests};
use crate::registry::FunctionRegistry;
use crate::state::{AppState, ServerConfig};

pub fn build_router(st: AppState) -> Router {
    Router::new()
        .route("/health", get(healthz))
        .route("/healthz", get(healthz))
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .route("/functions", get(list_functions))
        .route("/:name", post(invoke))
        .layer(middleware::from_fn_with_state(st.clone(), track_requests))
        .with_state(st)
}

/// One HTTP server instance over a directory of functions.
///
/// Functions are discovered once at construction; statistics and admission
/// state live as long as the instance.
pub struct Server {
    state: AppState,
}

impl Server {
    pub async fn new(
        dir: &Path,
        config: ServerConfig,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        if config.max_concurrent_requests == 0 {
            anyhow::bail!("max concurrent requests must be at least 1");
        }
        let registry = FunctionRegistry::discover(dir).await?;
        if registry.is_empty() {
            tracing::warn!(dir=%dir.display(), "no functions found");
        }
        Ok(Self {
            state: AppState::new(config, registry, shutdown),
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until the shutdown token is cancelled. In-flight invocations are
    /// cancelled with it and answered before the listener closes.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let shutdown = self.state.shutdown.clone();
        let addr = listener.local_addr()?;
        tracing::info!(
            %addr,
            functions = self.state.registry.len(),
            max_concurrent = self.state.config.max_concurrent_requests,
            timeout = ?self.state.config.request_timeout,
            "fnserve listening"
        );

        let app = build_router(self.state);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        tracing::info!(%addr, "server stopped");
        Ok(())
    }
}
