use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::HandlerError;

/// Handler-specific fields of a request, after `type`/`action` are stripped.
pub type Payload = Map<String, Value>;

/// One entry a handler appends to its result bucket.
pub type ResultEntry = Value;

/// Request key naming the operation type.
pub const TYPE_KEY: &str = "type";
/// Request key naming the operation action.
pub const ACTION_KEY: &str = "action";
/// Legacy spelling of [`TYPE_KEY`], still accepted on input.
pub const LEGACY_TYPE_KEY: &str = "operation_type";
/// Legacy spelling of [`ACTION_KEY`], still accepted on input.
pub const LEGACY_ACTION_KEY: &str = "operation_action";

/// A raw, loosely-typed operation request as submitted by a caller.
///
/// Carries `type` and `action` alongside arbitrary handler fields. Nothing
/// about the request is trusted until the dispatcher has resolved it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationRequest(Map<String, Value>);

impl OperationRequest {
    /// Wraps an existing JSON object.
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Builds a request from a type, an action and payload fields.
    #[must_use]
    pub fn with_fields(op_type: &str, action: &str, payload: Payload) -> Self {
        let mut fields = payload;
        fields.insert(TYPE_KEY.to_string(), Value::String(op_type.to_string()));
        fields.insert(ACTION_KEY.to_string(), Value::String(action.to_string()));
        Self(fields)
    }

    /// Raw `type` value, falling back to the legacy key.
    #[must_use]
    pub fn op_type(&self) -> Option<&Value> {
        self.0.get(TYPE_KEY).or_else(|| self.0.get(LEGACY_TYPE_KEY))
    }

    /// Raw `action` value, falling back to the legacy key.
    #[must_use]
    pub fn action(&self) -> Option<&Value> {
        self.0.get(ACTION_KEY).or_else(|| self.0.get(LEGACY_ACTION_KEY))
    }

    /// Consumes the request and returns its payload with every spelling of
    /// the routing keys removed.
    #[must_use]
    pub fn into_payload(mut self) -> Payload {
        for key in [TYPE_KEY, ACTION_KEY, LEGACY_TYPE_KEY, LEGACY_ACTION_KEY] {
            self.0.remove(key);
        }
        self.0
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for OperationRequest {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Typed accessors for handler payloads.
///
/// Payloads arrive from loosely-typed callers, so integer fields are also
/// accepted as numeric strings.
pub trait PayloadExt {
    /// Reads a required unsigned integer field.
    ///
    /// # Errors
    ///
    /// Returns `HandlerError::MissingField` if absent or null, and
    /// `HandlerError::InvalidField` if the value is not a non-negative integer.
    fn require_u64(&self, field: &str) -> Result<u64, HandlerError>;

    /// Reads a required string field.
    ///
    /// # Errors
    ///
    /// Returns `HandlerError::MissingField` if absent or null, and
    /// `HandlerError::InvalidField` if the value is not a string.
    fn require_str(&self, field: &str) -> Result<&str, HandlerError>;

    /// Reads an optional string field. `null` reads as absent.
    ///
    /// # Errors
    ///
    /// Returns `HandlerError::InvalidField` if present but not a string.
    fn optional_str(&self, field: &str) -> Result<Option<&str>, HandlerError>;
}

impl PayloadExt for Payload {
    fn require_u64(&self, field: &str) -> Result<u64, HandlerError> {
        match self.get(field) {
            None | Some(Value::Null) => Err(HandlerError::MissingField(field.to_string())),
            Some(Value::Number(n)) => n.as_u64().ok_or_else(|| HandlerError::InvalidField {
                field: field.to_string(),
                reason: format!("expected a non-negative integer, got {n}"),
            }),
            Some(Value::String(s)) => {
                s.trim()
                    .parse::<u64>()
                    .map_err(|_| HandlerError::InvalidField {
                        field: field.to_string(),
                        reason: format!("expected a non-negative integer, got {s:?}"),
                    })
            }
            Some(other) => Err(HandlerError::InvalidField {
                field: field.to_string(),
                reason: format!("expected a non-negative integer, got {other}"),
            }),
        }
    }

    fn require_str(&self, field: &str) -> Result<&str, HandlerError> {
        self.optional_str(field)?
            .ok_or_else(|| HandlerError::MissingField(field.to_string()))
    }

    fn optional_str(&self, field: &str) -> Result<Option<&str>, HandlerError> {
        match self.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(HandlerError::InvalidField {
                field: field.to_string(),
                reason: format!("expected a string, got {other}"),
            }),
        }
    }
}
