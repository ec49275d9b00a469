//! Enrollment operation family.
//!
//! Example batch:
//!
//! ```json
//! [
//!   { "type": "enrollment", "action": "create", "attendee_id": 1234, "session_id": 9 },
//!   { "type": "enrollment", "action": "transition", "attendee_id": 1234, "session_id": 9, "to": "attended" }
//! ]
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use opfactory_core::{
    HandlerError, HandlerTable, OperationFamily, OperationScope, Payload, PayloadExt,
};
use serde_json::json;
use tracing::info;

use crate::storage::{
    Enrollment, EnrollmentCache, EnrollmentKey, EnrollmentStatus, EnrollmentStore, StoreError,
};

pub const OPERATION_TYPE_ENROLLMENT: &str = "enrollment";

pub const OPERATION_ACTION_CREATE: &str = "create";
pub const OPERATION_ACTION_DELETE: &str = "delete";
pub const OPERATION_ACTION_TRANSITION: &str = "transition";
pub const OPERATION_ACTION_UPDATE: &str = "update";

/// Failure codes carried on `HandlerError::Rejected`.
pub mod codes {
    pub const NOT_FOUND: i32 = 404;
    pub const CONFLICT: i32 = 409;
    pub const INVALID_TRANSITION: i32 = 422;
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        let code = match err {
            StoreError::Duplicate(_) | StoreError::Conflict { .. } => codes::CONFLICT,
            StoreError::NotFound(_) => codes::NOT_FOUND,
        };
        HandlerError::rejected(code, err.to_string())
    }
}

/// Writes a dry-run batch would have made, so later operations in the same
/// batch see them. `None` marks a record the batch would have deleted.
#[derive(Debug, Default)]
pub struct DryRunOverlay {
    records: HashMap<EnrollmentKey, Option<Enrollment>>,
}

impl DryRunOverlay {
    fn staged(&self, key: &EnrollmentKey) -> Option<Option<Enrollment>> {
        self.records.get(key).cloned()
    }

    fn stage(&mut self, key: EnrollmentKey, record: Option<Enrollment>) {
        self.records.insert(key, record);
    }
}

type EnrollmentScope<'a> = OperationScope<'a, DryRunOverlay>;

/// Create, delete, update and transition attendee enrollments.
///
/// Reads go through the [`EnrollmentCache`]. Updates and transitions only
/// land if the stored status still matches what was read. On dry runs
/// nothing reaches the store; writes are staged in the batch's
/// [`DryRunOverlay`] instead.
pub struct EnrollmentOperations {
    store: Arc<dyn EnrollmentStore>,
    cache: Arc<EnrollmentCache>,
}

impl EnrollmentOperations {
    #[must_use]
    pub fn new(store: Arc<dyn EnrollmentStore>, cache: Arc<EnrollmentCache>) -> Self {
        Self { store, cache }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn EnrollmentStore> {
        &self.store
    }

    fn lookup(&self, scope: &mut EnrollmentScope<'_>, key: &EnrollmentKey) -> Option<Enrollment> {
        if scope.is_dry_run() {
            if let Some(staged) = scope.state().staged(key) {
                return staged;
            }
        }
        self.cache.get(key)
    }

    fn existing(
        &self,
        scope: &mut EnrollmentScope<'_>,
        key: &EnrollmentKey,
    ) -> Result<Enrollment, HandlerError> {
        self.lookup(scope, key)
            .ok_or_else(|| StoreError::NotFound(*key).into())
    }

    /// Writes `enrollment` back if its stored status is still `read`.
    fn write_back(
        &self,
        scope: &mut EnrollmentScope<'_>,
        read: EnrollmentStatus,
        enrollment: &Enrollment,
    ) -> Result<(), HandlerError> {
        if scope.is_dry_run() {
            scope.state().stage(enrollment.key(), Some(enrollment.clone()));
        } else {
            self.store.replace_if(read, enrollment.clone())?;
        }
        Ok(())
    }
}

impl OperationFamily for EnrollmentOperations {
    type BatchState = DryRunOverlay;

    fn name(&self) -> &'static str {
        "enrollment"
    }

    fn valid_types(&self) -> &[&'static str] {
        &[OPERATION_TYPE_ENROLLMENT]
    }

    fn valid_actions(&self) -> &[&'static str] {
        &[
            OPERATION_ACTION_CREATE,
            OPERATION_ACTION_DELETE,
            OPERATION_ACTION_TRANSITION,
            OPERATION_ACTION_UPDATE,
        ]
    }

    fn handlers(&self) -> HandlerTable<Self> {
        HandlerTable::new()
            .with(OPERATION_TYPE_ENROLLMENT, OPERATION_ACTION_CREATE, enrollment_create)
            .with(OPERATION_TYPE_ENROLLMENT, OPERATION_ACTION_DELETE, enrollment_delete)
            .with(OPERATION_TYPE_ENROLLMENT, OPERATION_ACTION_TRANSITION, enrollment_transition)
            .with(OPERATION_TYPE_ENROLLMENT, OPERATION_ACTION_UPDATE, enrollment_update)
    }
}

fn key_from(payload: &Payload) -> Result<EnrollmentKey, HandlerError> {
    Ok(EnrollmentKey::new(
        payload.require_u64("attendee_id")?,
        payload.require_u64("session_id")?,
    ))
}

fn parse_status(field: &str, raw: &str) -> Result<EnrollmentStatus, HandlerError> {
    raw.parse().map_err(|e: crate::storage::UnknownStatus| HandlerError::InvalidField {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

fn enrollment_create(
    ops: &EnrollmentOperations,
    scope: &mut EnrollmentScope<'_>,
    payload: &Payload,
) -> Result<(), HandlerError> {
    let key = key_from(payload)?;
    let status = match payload.optional_str("status")? {
        None => EnrollmentStatus::Enrolled,
        Some(raw) => match parse_status("status", raw)? {
            s @ (EnrollmentStatus::Enrolled | EnrollmentStatus::Waitlisted) => s,
            other => {
                return Err(HandlerError::InvalidField {
                    field: "status".to_string(),
                    reason: format!("new enrollments cannot start as {other}"),
                })
            }
        },
    };
    let notes = payload.optional_str("notes")?.map(str::to_string);

    if ops.lookup(scope, &key).is_some() {
        return Err(StoreError::Duplicate(key).into());
    }

    let enrollment = Enrollment::new(key, status, notes);
    let dry_run = scope.is_dry_run();
    if dry_run {
        scope.state().stage(key, Some(enrollment.clone()));
    } else {
        ops.store.insert(enrollment.clone())?;
    }

    info!(%key, %status, dry_run, "enrollment created");
    scope.push(json!({ "created": enrollment, "dry_run": dry_run }));
    Ok(())
}

fn enrollment_delete(
    ops: &EnrollmentOperations,
    scope: &mut EnrollmentScope<'_>,
    payload: &Payload,
) -> Result<(), HandlerError> {
    let key = key_from(payload)?;
    let dry_run = scope.is_dry_run();
    let enrollment = if dry_run {
        let enrollment = ops.existing(scope, &key)?;
        scope.state().stage(key, None);
        enrollment
    } else {
        ops.store.remove(&key)?
    };

    info!(%key, dry_run, "enrollment deleted");
    scope.push(json!({ "deleted": enrollment, "dry_run": dry_run }));
    Ok(())
}

fn enrollment_update(
    ops: &EnrollmentOperations,
    scope: &mut EnrollmentScope<'_>,
    payload: &Payload,
) -> Result<(), HandlerError> {
    let key = key_from(payload)?;
    if !payload.contains_key("notes") {
        return Err(HandlerError::MissingField("notes".to_string()));
    }
    let notes = payload.optional_str("notes")?.map(str::to_string);

    let mut enrollment = ops.existing(scope, &key)?;
    let read = enrollment.status;
    enrollment.notes = notes;
    ops.write_back(scope, read, &enrollment)?;

    let dry_run = scope.is_dry_run();
    info!(%key, dry_run, "enrollment updated");
    scope.push(json!({ "updated": enrollment, "dry_run": dry_run }));
    Ok(())
}

fn enrollment_transition(
    ops: &EnrollmentOperations,
    scope: &mut EnrollmentScope<'_>,
    payload: &Payload,
) -> Result<(), HandlerError> {
    let key = key_from(payload)?;
    let to = parse_status("to", payload.require_str("to")?)?;

    let mut enrollment = ops.existing(scope, &key)?;
    let from = enrollment.status;
    if !from.can_transition_to(to) {
        let reason = if from.is_terminal() {
            format!("enrollment for {key} is {from} and can no longer change")
        } else {
            format!("enrollment for {key} cannot move from {from} to {to}")
        };
        return Err(HandlerError::rejected(codes::INVALID_TRANSITION, reason));
    }

    enrollment.status = to;
    ops.write_back(scope, from, &enrollment)?;

    let dry_run = scope.is_dry_run();
    info!(%key, %from, %to, dry_run, "enrollment transitioned");
    scope.push(json!({
        "transitioned": enrollment,
        "from": from,
        "to": to,
        "dry_run": dry_run,
    }));
    Ok(())
}
