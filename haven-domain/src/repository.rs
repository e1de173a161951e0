use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus, PropertyListing};
use crate::error::StoreError;

/// A service's local booking replica.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Atomic check-and-insert, serialized per property: fails with
    /// `AvailabilityConflict` if an active booking on the same property overlaps.
    async fn insert_if_available(&self, booking: &Booking) -> Result<(), StoreError>;

    /// Unconditional insert for projected snapshots; `DuplicateKey` if the id exists.
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError>;

    /// Physically removes a row that was never announced on the log.
    async fn remove(&self, id: Uuid) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    /// Bookings on the property whose status is PENDING or ACCEPTED.
    async fn find_active_by_property(&self, property_id: Uuid) -> Result<Vec<Booking>, StoreError>;

    /// Compare-and-set on status. `updated_at` never moves backwards:
    /// the stored value becomes `max(current, updated_at)`.
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Booking, StoreError>;

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Booking>, StoreError>;

    async fn list_by_traveler(&self, traveler_id: &str) -> Result<Vec<Booking>, StoreError>;

    /// ACCEPTED bookings whose stay ended on or before `today`.
    async fn list_due_for_completion(&self, today: NaiveDate) -> Result<Vec<Booking>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// A delivery the projection worker gave up on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeadLetter {
    pub id: Uuid,
    pub topic: String,
    pub message_key: Option<String>,
    pub partition: i32,
    pub offset: i64,
    pub payload: String,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn record(&self, letter: &DeadLetter) -> Result<(), StoreError>;

    /// Most recent first.
    async fn list(&self, limit: i64) -> Result<Vec<DeadLetter>, StoreError>;
}

/// Read-only view of the property catalog service.
#[async_trait]
pub trait PropertyCatalog: Send + Sync {
    async fn get_listing(&self, property_id: Uuid) -> Result<Option<PropertyListing>, StoreError>;
}
