//! Network configuration for the HTTP surface.

use std::time::Duration;

/// Bind address and per-request limits for the HTTP server.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Allowed CORS origins. `"*"` allows any origin.
    pub cors_origins: Vec<String>,
    /// Maximum time a health request may take. Batch requests are exempt:
    /// a batch that outlives its client still commits.
    pub request_timeout: Duration,
    /// Largest accepted JSON body in bytes.
    pub body_limit_bytes: usize,
    /// How long shutdown waits for running batches before giving up.
    pub drain_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            body_limit_bytes: 2 * 1024 * 1024,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl NetworkConfig {
    /// `host:port` string handed to the TCP listener.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
