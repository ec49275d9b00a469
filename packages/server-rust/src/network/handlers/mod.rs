//! HTTP handlers and the shared state they extract.

pub mod health;
pub mod operations;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use operations::{operations_handler, OperationsQuery};

use std::sync::Arc;
use std::time::Instant;

use crate::service::{BatchRunner, ServerConfig};

use super::ShutdownController;

/// Shared state handed to every handler through `State`.
///
/// Everything sits behind `Arc`, so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Dispatcher for the family served over HTTP.
    pub runner: Arc<dyn BatchRunner>,
    pub service_config: Arc<ServerConfig>,
    pub shutdown: Arc<ShutdownController>,
    /// Process start, for uptime reporting.
    pub start_time: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(
        runner: Arc<dyn BatchRunner>,
        service_config: Arc<ServerConfig>,
        shutdown: Arc<ShutdownController>,
    ) -> Self {
        Self {
            runner,
            service_config,
            shutdown,
            start_time: Instant::now(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use super::AppState;
    use crate::network::ShutdownController;
    use crate::operations::enrollment_dispatcher;
    use crate::service::ServerConfig;

    /// State over a fresh enrollment dispatcher, already `Ready`.
    pub(crate) fn ready_state(service_config: ServerConfig) -> AppState {
        let runner = Arc::new(enrollment_dispatcher(&service_config));
        let state = AppState::new(
            runner,
            Arc::new(service_config),
            Arc::new(ShutdownController::new()),
        );
        state.shutdown.set_ready();
        state
    }
}
