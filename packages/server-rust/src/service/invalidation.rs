//! Cache invalidation collaborators run after each successful operation.

use std::sync::Arc;

use opfactory_core::CacheInvalidator;
use parking_lot::RwLock;

/// Invalidator for deployments with nothing to flush.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInvalidator;

impl CacheInvalidator for NoopInvalidator {
    fn invalidate(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Fans one invalidation out to several caches, in registration order.
///
/// Stops at the first failing cache and returns its error; later caches are
/// not flushed for that operation. Caches can be added while the owning
/// dispatcher is already shared.
#[derive(Default)]
pub struct CompositeInvalidator {
    invalidators: RwLock<Vec<Arc<dyn CacheInvalidator>>>,
}

impl CompositeInvalidator {
    #[must_use]
    pub fn new(invalidators: Vec<Arc<dyn CacheInvalidator>>) -> Self {
        Self {
            invalidators: RwLock::new(invalidators),
        }
    }

    pub fn add(&self, invalidator: Arc<dyn CacheInvalidator>) {
        self.invalidators.write().push(invalidator);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.invalidators.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invalidators.read().is_empty()
    }
}

impl CacheInvalidator for CompositeInvalidator {
    fn invalidate(&self) -> anyhow::Result<()> {
        for invalidator in self.invalidators.read().iter() {
            invalidator.invalidate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    struct Recording {
        name: &'static str,
        fail: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl CacheInvalidator for Recording {
        fn invalidate(&self) -> anyhow::Result<()> {
            self.log.lock().push(self.name);
            if self.fail {
                anyhow::bail!("{} unavailable", self.name);
            }
            Ok(())
        }
    }

    fn recording(
        name: &'static str,
        fail: bool,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Arc<dyn CacheInvalidator> {
        Arc::new(Recording {
            name,
            fail,
            log: Arc::clone(log),
        })
    }

    #[test]
    fn noop_always_succeeds() {
        assert!(NoopInvalidator.invalidate().is_ok());
    }

    #[test]
    fn composite_flushes_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let composite = CompositeInvalidator::new(vec![recording("entity", false, &log)]);
        composite.add(recording("memcache", false, &log));

        composite.invalidate().unwrap();
        assert_eq!(*log.lock(), vec!["entity", "memcache"]);
        assert_eq!(composite.len(), 2);
    }

    #[test]
    fn composite_stops_at_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let composite = CompositeInvalidator::new(vec![
            recording("entity", true, &log),
            recording("memcache", false, &log),
        ]);

        let err = composite.invalidate().unwrap_err();
        assert_eq!(err.to_string(), "entity unavailable");
        assert_eq!(*log.lock(), vec!["entity"]);
    }

    #[test]
    fn empty_composite_is_noop() {
        let composite = CompositeInvalidator::default();
        assert!(composite.is_empty());
        assert!(composite.invalidate().is_ok());
    }
}
