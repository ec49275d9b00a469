//! Server lifecycle: health state and tracking of running batches.
//!
//! Health lives in an `ArcSwap` so probes never block. Every batch accepted
//! over HTTP holds a [`BatchGuard`]; shutdown waits until the last guard is
//! dropped or the drain timeout expires.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{watch, Notify};

/// `Starting -> Ready -> Draining -> Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Starting,
    Ready,
    Draining,
    Stopped,
}

impl HealthState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }

    /// Whether new batches may be accepted in this state.
    #[must_use]
    pub fn accepts_batches(self) -> bool {
        self == Self::Ready
    }
}

#[derive(Debug, Default)]
struct Running {
    count: AtomicUsize,
    idle: Notify,
}

/// Shared lifecycle handle for the HTTP surface.
#[derive(Debug)]
pub struct ShutdownController {
    state: ArcSwap<HealthState>,
    signal: watch::Sender<bool>,
    running: Arc<Running>,
}

impl ShutdownController {
    /// Starts in [`HealthState::Starting`].
    #[must_use]
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            state: ArcSwap::from_pointee(HealthState::Starting),
            signal,
            running: Arc::new(Running::default()),
        }
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.state.load()
    }

    pub fn set_ready(&self) {
        self.state.store(Arc::new(HealthState::Ready));
    }

    /// Moves to `Draining` and wakes every shutdown receiver.
    pub fn trigger_shutdown(&self) {
        self.state.store(Arc::new(HealthState::Draining));
        // No receivers is fine.
        let _ = self.signal.send(true);
    }

    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }

    /// Marks one batch as running until the guard is dropped.
    #[must_use]
    pub fn batch_guard(&self) -> BatchGuard {
        self.running.count.fetch_add(1, Ordering::AcqRel);
        BatchGuard {
            running: Arc::clone(&self.running),
        }
    }

    #[must_use]
    pub fn running_batches(&self) -> usize {
        self.running.count.load(Ordering::Acquire)
    }

    /// Waits until no batch is running, then moves to `Stopped`.
    ///
    /// Returns `false`, leaving the state untouched, if `timeout` expires
    /// first.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drained = tokio::time::timeout(timeout, async {
            loop {
                let idle = self.running.idle.notified();
                if self.running_batches() == 0 {
                    return;
                }
                idle.await;
            }
        })
        .await
        .is_ok();

        if drained {
            self.state.store(Arc::new(HealthState::Stopped));
        }
        drained
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Held for the lifetime of one HTTP batch. Dropping it, including during
/// unwinding, releases the slot.
#[derive(Debug)]
pub struct BatchGuard {
    running: Arc<Running>,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        if self.running.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.running.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        let controller = ShutdownController::new();
        assert_eq!(controller.health_state(), HealthState::Starting);
        assert!(!controller.health_state().accepts_batches());

        controller.set_ready();
        assert_eq!(controller.health_state(), HealthState::Ready);
        assert!(controller.health_state().accepts_batches());

        controller.trigger_shutdown();
        assert_eq!(controller.health_state(), HealthState::Draining);
        assert_eq!(controller.health_state().as_str(), "draining");
    }

    #[test]
    fn guards_count_running_batches() {
        let controller = ShutdownController::new();
        let first = controller.batch_guard();
        let second = controller.batch_guard();
        assert_eq!(controller.running_batches(), 2);

        drop(first);
        assert_eq!(controller.running_batches(), 1);
        drop(second);
        assert_eq!(controller.running_batches(), 0);
    }

    #[tokio::test]
    async fn shutdown_receiver_is_notified() {
        let controller = ShutdownController::new();
        let mut rx = controller.shutdown_receiver();
        assert!(!*rx.borrow());

        controller.trigger_shutdown();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn drain_completes_when_idle() {
        let controller = ShutdownController::new();
        controller.trigger_shutdown();

        assert!(controller.wait_for_drain(Duration::from_secs(1)).await);
        assert_eq!(controller.health_state(), HealthState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_running_batch() {
        let controller = Arc::new(ShutdownController::new());
        let guard = controller.batch_guard();
        controller.trigger_shutdown();

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(guard);
        });

        assert!(controller.wait_for_drain(Duration::from_secs(30)).await);
        assert_eq!(controller.health_state(), HealthState::Stopped);
        release.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn drain_times_out_with_batch_held() {
        let controller = ShutdownController::new();
        let _guard = controller.batch_guard();
        controller.trigger_shutdown();

        let started = tokio::time::Instant::now();
        assert!(!controller.wait_for_drain(Duration::from_secs(30)).await);
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert_eq!(controller.health_state(), HealthState::Draining);
    }
}
