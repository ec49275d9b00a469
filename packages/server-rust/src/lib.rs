//! opfactory server: batch dispatcher, enrollment operations, HTTP surface.

pub mod network;
pub mod operations;
pub mod service;
pub mod storage;

pub use operations::{enrollment_dispatcher, EnrollmentOperations};
pub use service::{BatchOutcome, BatchRunner, Dispatcher, ServerConfig};
