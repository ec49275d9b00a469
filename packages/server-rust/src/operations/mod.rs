//! Concrete operation families and their wiring.

pub mod enrollment;

use std::sync::Arc;

use opfactory_core::CacheInvalidator;

pub use enrollment::{DryRunOverlay, EnrollmentOperations};

use crate::service::config::ServerConfig;
use crate::service::dispatcher::Dispatcher;
use crate::service::invalidation::CompositeInvalidator;
use crate::storage::{EnrollmentCache, EnrollmentStore, MemoryEnrollmentStore};

/// Builds an enrollment dispatcher over a fresh in-memory store.
#[must_use]
pub fn enrollment_dispatcher(config: &ServerConfig) -> Dispatcher<EnrollmentOperations> {
    enrollment_dispatcher_with_store(Arc::new(MemoryEnrollmentStore::new()), config)
}

/// Builds an enrollment dispatcher over `store`, with a read cache that is
/// flushed after every successful operation.
#[must_use]
pub fn enrollment_dispatcher_with_store(
    store: Arc<dyn EnrollmentStore>,
    config: &ServerConfig,
) -> Dispatcher<EnrollmentOperations> {
    let cache = Arc::new(EnrollmentCache::new(Arc::clone(&store), config.cache_capacity));
    let invalidator = CompositeInvalidator::new(vec![cache.clone() as Arc<dyn CacheInvalidator>]);
    Dispatcher::new(
        EnrollmentOperations::new(store, cache),
        Arc::new(invalidator),
    )
}
