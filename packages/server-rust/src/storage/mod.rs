//! Enrollment persistence and its read cache.

pub mod cache;
pub mod enrollment_store;

pub use cache::EnrollmentCache;
pub use enrollment_store::{
    Enrollment, EnrollmentKey, EnrollmentStatus, EnrollmentStore, MemoryEnrollmentStore,
    StoreError, UnknownStatus,
};
