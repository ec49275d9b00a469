//! Batch dispatch: resolving requests, executing them, and shaping the
//! outcome.
//!
//! 1. **Dispatcher** (`dispatcher`): load phase validation, execute phase
//!    fail-fast loop, the object-safe [`BatchRunner`] view
//! 2. **Outcome** (`outcome`): ordered result buckets and the error list
//! 3. **Invalidation** (`invalidation`): post-operation cache flush fan-out
//! 4. **Config** (`config`): family-independent dispatcher settings

pub mod config;
pub mod dispatcher;
pub mod invalidation;
pub mod outcome;

pub use config::ServerConfig;
pub use dispatcher::{Batch, BatchRunner, Dispatcher, ResolvedOperation};
pub use invalidation::{CompositeInvalidator, NoopInvalidator};
pub use outcome::{BatchOutcome, ResultBuckets, ERRORS_KEY};
