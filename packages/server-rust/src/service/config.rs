/// Dispatcher-level configuration, independent of the HTTP surface.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Dry-run flag applied when a caller does not state one.
    pub default_dry_run: bool,
    /// Maximum number of entries held by the enrollment read cache.
    pub cache_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_dry_run: false,
            cache_capacity: 1024,
        }
    }
}
