//! Network module with deferred startup.
//!
//! `new()` wires shared state, `start()` binds the listener, `serve()`
//! accepts connections until the shutdown future resolves. Splitting
//! `start()` from `serve()` lets callers learn the bound port (useful with
//! port 0) before traffic flows.

use std::future::Future;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    health_handler, liveness_handler, operations_handler, readiness_handler, AppState,
};
use super::middleware::{build_http_layers, build_timeout_layer};
use super::shutdown::ShutdownController;
use crate::service::{BatchRunner, ServerConfig};

/// Owns the HTTP server lifecycle for one dispatcher.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    state: AppState,
}

impl NetworkModule {
    /// Allocates shared state without binding any port.
    #[must_use]
    pub fn new(
        config: NetworkConfig,
        runner: Arc<dyn BatchRunner>,
        service_config: ServerConfig,
    ) -> Self {
        let state = AppState::new(
            runner,
            Arc::new(service_config),
            Arc::new(ShutdownController::new()),
        );
        Self {
            config,
            listener: None,
            state,
        }
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.state.shutdown)
    }

    /// Routes:
    /// - `POST /operations` -- run a batch
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- liveness probe
    /// - `GET /health/ready` -- readiness probe
    ///
    /// Only the health routes carry the request timeout.
    pub fn build_router(&self) -> Router {
        let health = Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .layer(build_timeout_layer(&self.config));

        Router::new()
            .route("/operations", post(operations_handler))
            .merge(health)
            .layer(DefaultBodyLimit::max(self.config.body_limit_bytes))
            .layer(build_http_layers(&self.config))
            .with_state(self.state.clone())
    }

    /// Binds the listener and returns the bound port, which differs from
    /// the configured one when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then waits for running batches.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server
    /// hits a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();
        let controller = self.shutdown_controller();

        controller.set_ready();
        info!(family = self.state.runner.family_name(), "serving HTTP");

        let signal_controller = Arc::clone(&controller);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                signal_controller.trigger_shutdown();
            })
            .await?;

        drain(&controller, &self.config).await;
        Ok(())
    }
}

async fn drain(controller: &ShutdownController, config: &NetworkConfig) {
    controller.trigger_shutdown();
    let running = controller.running_batches();
    if running > 0 {
        info!(running, "waiting for running batches");
    }

    if controller.wait_for_drain(config.drain_timeout).await {
        info!("all batches drained");
    } else {
        warn!(
            running = controller.running_batches(),
            "drain timeout expired with batches still running"
        );
    }
}
