use std::time::Duration;
use uuid::Uuid;

use crate::booking::BookingStatus;

/// Errors surfaced to callers of the booking operations.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Property {property_id} already has an active booking {conflicting_id} overlapping the requested dates")]
    AvailabilityConflict {
        property_id: Uuid,
        conflicting_id: Uuid,
    },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("Booking not found: {0}")]
    NotFound(Uuid),

    #[error("Property not found: {0}")]
    PropertyNotFound(Uuid),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Event log unavailable: {0}")]
    LogUnavailable(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl BookingError {
    /// The client may retry the same request later and expect a different outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::LogUnavailable(_))
    }
}

/// Errors from a local booking replica.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Overlaps active booking {conflicting_id}")]
    AvailabilityConflict { conflicting_id: Uuid },

    #[error("Duplicate booking id: {0}")]
    DuplicateKey(Uuid),

    #[error("Booking not found: {0}")]
    NotFound(Uuid),

    #[error("Booking {id} is {actual}, not {expected}")]
    StatusMismatch {
        id: Uuid,
        expected: BookingStatus,
        actual: BookingStatus,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Errors from the event log client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LogError {
    #[error("Event log unavailable: {0}")]
    Unavailable(String),

    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed event: {0}")]
    Decode(String),
}

impl From<LogError> for BookingError {
    fn from(err: LogError) -> Self {
        BookingError::LogUnavailable(err.to_string())
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => BookingError::NotFound(id),
            other => BookingError::Store(other.to_string()),
        }
    }
}
