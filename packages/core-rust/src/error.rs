//! Error types for the two failure tiers of a batch.
//!
//! Load-time rejections ([`RejectedRequest`]) are recorded and skipped.
//! Execute-time failures ([`OperationFailure`]) abort the rest of the batch.

use serde_json::Value;

use crate::handler_id::HandlerId;
use crate::types::Payload;

/// Why a request was dropped during the load phase.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("missing operation-type")]
    MissingType,
    #[error("invalid operation-type: {0}")]
    InvalidType(String),
    #[error("missing operation-action")]
    MissingAction,
    #[error("invalid operation-action: {0}")]
    InvalidAction(String),
    #[error("no handler registered for {handler_id} (type {op_type:?}, action {action:?})")]
    NoHandler {
        handler_id: HandlerId,
        op_type: String,
        action: String,
    },
}

impl RejectReason {
    /// Renders a raw routing value for an `Invalid*` message. Strings are
    /// shown bare, anything else as JSON text.
    #[must_use]
    pub fn render_value(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// A rejected request together with its position in the submitted batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("request {index}: {reason}")]
pub struct RejectedRequest {
    /// Zero-based submission index.
    pub index: usize,
    pub reason: RejectReason,
}

/// Error returned by a handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    /// Business-rule refusal with a caller-facing code.
    #[error("{message}")]
    Rejected { code: i32, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    #[must_use]
    pub fn rejected(code: i32, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    /// Numeric code carried to [`OperationFailure::code`]. Zero unless the
    /// handler supplied one.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Rejected { code, .. } => *code,
            _ => 0,
        }
    }
}

/// What went wrong while executing one resolved operation.
#[derive(Debug, thiserror::Error)]
pub enum FailureCause {
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The post-operation cache invalidation collaborator failed.
    #[error("cache invalidation failed: {0}")]
    Invalidation(#[source] anyhow::Error),
}

impl FailureCause {
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Handler(e) => e.code(),
            Self::Invalidation(_) => 0,
        }
    }
}

/// A handler (or its follow-up invalidation) failed; the batch stops here.
///
/// Displays as `Operation: {handler_id}: {message}`, which is exactly the
/// string appended to the batch's error list.
#[derive(Debug, thiserror::Error)]
#[error("Operation: {handler_id}: {message}")]
pub struct OperationFailure {
    handler_id: HandlerId,
    payload: Payload,
    message: String,
    code: i32,
    #[source]
    cause: FailureCause,
}

impl OperationFailure {
    #[must_use]
    pub fn new(handler_id: HandlerId, payload: Payload, cause: FailureCause) -> Self {
        Self {
            handler_id,
            payload,
            message: cause.to_string(),
            code: cause.code(),
            cause,
        }
    }

    #[must_use]
    pub fn handler_id(&self) -> &HandlerId {
        &self.handler_id
    }

    /// Payload of the operation that failed, as it was passed to the handler.
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn code(&self) -> i32 {
        self.code
    }

    #[must_use]
    pub fn cause(&self) -> &FailureCause {
        &self.cause
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use serde_json::json;

    use super::*;
    use crate::handler_id::derive_handler_id;

    #[test]
    fn reject_reasons_name_the_offending_value() {
        let reason = RejectReason::InvalidType("bogus".to_string());
        assert_eq!(reason.to_string(), "invalid operation-type: bogus");

        let rejected = RejectedRequest { index: 3, reason };
        assert_eq!(rejected.to_string(), "request 3: invalid operation-type: bogus");
    }

    #[test]
    fn render_value_shows_non_strings_as_json() {
        assert_eq!(RejectReason::render_value(&json!("create")), "create");
        assert_eq!(RejectReason::render_value(&json!(12)), "12");
        assert_eq!(RejectReason::render_value(&json!(["a"])), "[\"a\"]");
    }

    #[test]
    fn failure_displays_handler_and_message() {
        let failure = OperationFailure::new(
            derive_handler_id("enrollment", "delete"),
            Payload::new(),
            FailureCause::Handler(HandlerError::rejected(404, "enrollment 1/9 not found")),
        );
        assert_eq!(
            failure.to_string(),
            "Operation: enrollment_delete: enrollment 1/9 not found"
        );
        assert_eq!(failure.code(), 404);
        assert_eq!(failure.message(), "enrollment 1/9 not found");
    }

    #[test]
    fn failure_keeps_payload_and_source() {
        let mut payload = Payload::new();
        payload.insert("attendee_id".to_string(), json!(1));

        let failure = OperationFailure::new(
            derive_handler_id("enrollment", "create"),
            payload.clone(),
            FailureCause::Invalidation(anyhow::anyhow!("memcache unreachable")),
        );
        assert_eq!(failure.payload(), &payload);
        assert_eq!(failure.code(), 0);
        assert_eq!(
            failure.message(),
            "cache invalidation failed: memcache unreachable"
        );
        assert!(failure.source().is_some());
    }

    #[test]
    fn handler_error_codes_default_to_zero() {
        assert_eq!(HandlerError::MissingField("x".into()).code(), 0);
        assert_eq!(HandlerError::Other(anyhow::anyhow!("boom")).code(), 0);
        assert_eq!(HandlerError::rejected(409, "dup").code(), 409);
    }
}
