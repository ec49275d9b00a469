//! Enrollment records and the store trait enrollment handlers write through.
//!
//! [`MemoryEnrollmentStore`] keeps records in a [`DashMap`] and is what the
//! binary and the tests run against.

use std::fmt;
use std::str::FromStr;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Enrollments are unique per attendee and session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnrollmentKey {
    pub attendee_id: u64,
    pub session_id: u64,
}

impl EnrollmentKey {
    #[must_use]
    pub fn new(attendee_id: u64, session_id: u64) -> Self {
        Self {
            attendee_id,
            session_id,
        }
    }
}

impl fmt::Display for EnrollmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attendee {} / session {}",
            self.attendee_id, self.session_id
        )
    }
}

/// Lifecycle state of an enrollment.
///
/// State machine: `Waitlisted -> Enrolled -> Attended`, with `Cancelled`
/// reachable from both non-terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Waitlisted,
    Enrolled,
    Attended,
    Cancelled,
}

impl EnrollmentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waitlisted => "waitlisted",
            Self::Enrolled => "enrolled",
            Self::Attended => "attended",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Attended | Self::Cancelled)
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Waitlisted, Self::Enrolled | Self::Cancelled)
                | (Self::Enrolled, Self::Attended | Self::Cancelled)
        )
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a status string names no known state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown enrollment status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for EnrollmentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "waitlisted" => Ok(Self::Waitlisted),
            "enrolled" => Ok(Self::Enrolled),
            "attended" => Ok(Self::Attended),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// One attendee's enrollment in one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: Uuid,
    pub attendee_id: u64,
    pub session_id: u64,
    pub status: EnrollmentStatus,
    pub notes: Option<String>,
}

impl Enrollment {
    /// Creates a new record with a fresh id.
    #[must_use]
    pub fn new(key: EnrollmentKey, status: EnrollmentStatus, notes: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            attendee_id: key.attendee_id,
            session_id: key.session_id,
            status,
            notes,
        }
    }

    #[must_use]
    pub fn key(&self) -> EnrollmentKey {
        EnrollmentKey::new(self.attendee_id, self.session_id)
    }
}

/// Errors returned by an [`EnrollmentStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("enrollment for {0} already exists")]
    Duplicate(EnrollmentKey),
    #[error("enrollment for {0} not found")]
    NotFound(EnrollmentKey),
    /// The stored status moved since the caller read it.
    #[error("enrollment for {key} changed concurrently: expected {expected}, found {found}")]
    Conflict {
        key: EnrollmentKey,
        expected: EnrollmentStatus,
        found: EnrollmentStatus,
    },
}

/// Persistence backend for enrollments.
pub trait EnrollmentStore: Send + Sync {
    fn get(&self, key: &EnrollmentKey) -> Option<Enrollment>;

    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Duplicate` if a record already exists for the key.
    fn insert(&self, enrollment: Enrollment) -> Result<(), StoreError>;

    /// Overwrites an existing record, provided its stored status is still
    /// `expected`. The check and the write are atomic.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no record exists for the key, and
    /// `StoreError::Conflict` if the stored status differs from `expected`.
    fn replace_if(
        &self,
        expected: EnrollmentStatus,
        enrollment: Enrollment,
    ) -> Result<(), StoreError>;

    /// Removes a record and returns it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no record exists for the key.
    fn remove(&self, key: &EnrollmentKey) -> Result<Enrollment, StoreError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory [`EnrollmentStore`] backed by [`DashMap`].
#[derive(Debug, Default)]
pub struct MemoryEnrollmentStore {
    records: DashMap<EnrollmentKey, Enrollment>,
}

impl MemoryEnrollmentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EnrollmentStore for MemoryEnrollmentStore {
    fn get(&self, key: &EnrollmentKey) -> Option<Enrollment> {
        self.records.get(key).map(|r| r.clone())
    }

    fn insert(&self, enrollment: Enrollment) -> Result<(), StoreError> {
        match self.records.entry(enrollment.key()) {
            Entry::Occupied(entry) => Err(StoreError::Duplicate(*entry.key())),
            Entry::Vacant(entry) => {
                entry.insert(enrollment);
                Ok(())
            }
        }
    }

    fn replace_if(
        &self,
        expected: EnrollmentStatus,
        enrollment: Enrollment,
    ) -> Result<(), StoreError> {
        let key = enrollment.key();
        let Some(mut existing) = self.records.get_mut(&key) else {
            return Err(StoreError::NotFound(key));
        };
        if existing.status != expected {
            return Err(StoreError::Conflict {
                key,
                expected,
                found: existing.status,
            });
        }
        *existing = enrollment;
        Ok(())
    }

    fn remove(&self, key: &EnrollmentKey) -> Result<Enrollment, StoreError> {
        self.records
            .remove(key)
            .map(|(_, record)| record)
            .ok_or(StoreError::NotFound(*key))
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
