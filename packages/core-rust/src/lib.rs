//! `opfactory` core: the operation contract, handler ids, request payloads and
//! the typed errors shared by every operation family.

pub mod context;
pub mod error;
pub mod handler_id;
pub mod traits;
pub mod types;

pub use context::OperationScope;
pub use error::{FailureCause, HandlerError, OperationFailure, RejectReason, RejectedRequest};
pub use handler_id::{derive_handler_id, HandlerId};
pub use traits::{CacheInvalidator, HandlerFn, HandlerTable, OperationFamily};
pub use types::{OperationRequest, Payload, PayloadExt, ResultEntry};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
