//! In-process adapters for the domain ports. Used by the test suites and
//! for running a single node without Postgres or a broker.

mod log;

pub use log::InMemoryEventLog;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use haven_domain::{
    Booking, BookingStatus, BookingStore, DeadLetter, DeadLetterStore, PropertyCatalog,
    PropertyListing, StoreError,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use uuid::Uuid;

// ============================================================================
// Bookings
// ============================================================================

#[derive(Default)]
pub struct InMemoryBookingStore {
    bookings: RwLock<HashMap<Uuid, Booking>>,
    /// Serializes check-and-insert per property
    property_locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn property_lock(&self, property_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .property_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(property_id).or_default().clone()
    }
}

fn newest_first(mut bookings: Vec<Booking>) -> Vec<Booking> {
    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    bookings
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert_if_available(&self, booking: &Booking) -> Result<(), StoreError> {
        let lock = self.property_lock(booking.property_id);
        let _guard = lock.lock().await;

        let active = self.find_active_by_property(booking.property_id).await?;
        if let Some(existing) = active.iter().find(|b| b.date_range.overlaps(&booking.date_range)) {
            return Err(StoreError::AvailabilityConflict { conflicting_id: existing.id });
        }

        self.insert(booking).await
    }

    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut bookings = self.bookings.write().await;
        if bookings.contains_key(&booking.id) {
            return Err(StoreError::DuplicateKey(booking.id));
        }
        bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> Result<(), StoreError> {
        self.bookings
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn find_active_by_property(&self, property_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        let mut active: Vec<Booking> = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.property_id == property_id && b.status.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|b| b.date_range.start);
        Ok(active)
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Booking, StoreError> {
        let mut bookings = self.bookings.write().await;
        let booking = bookings.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if booking.status != expected {
            return Err(StoreError::StatusMismatch { id, expected, actual: booking.status });
        }
        booking.status = next;
        booking.updated_at = booking.updated_at.max(updated_at);
        Ok(booking.clone())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Booking>, StoreError> {
        let bookings = self.bookings.read().await;
        Ok(newest_first(
            bookings.values().filter(|b| b.owner_id == owner_id).cloned().collect(),
        ))
    }

    async fn list_by_traveler(&self, traveler_id: &str) -> Result<Vec<Booking>, StoreError> {
        let bookings = self.bookings.read().await;
        Ok(newest_first(
            bookings.values().filter(|b| b.traveler_id == traveler_id).cloned().collect(),
        ))
    }

    async fn list_due_for_completion(&self, today: NaiveDate) -> Result<Vec<Booking>, StoreError> {
        let mut due: Vec<Booking> = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.status == BookingStatus::Accepted && b.date_range.has_elapsed(today))
            .cloned()
            .collect();
        due.sort_by_key(|b| b.date_range.end);
        Ok(due)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// Dead letters
// ============================================================================

#[derive(Default)]
pub struct InMemoryDeadLetterStore {
    letters: RwLock<Vec<DeadLetter>>,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn record(&self, letter: &DeadLetter) -> Result<(), StoreError> {
        let mut letters = self.letters.write().await;
        if !letters.iter().any(|l| l.id == letter.id) {
            letters.push(letter.clone());
        }
        Ok(())
    }

    async fn list(&self, limit: i64) -> Result<Vec<DeadLetter>, StoreError> {
        let letters = self.letters.read().await;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(letters.iter().rev().take(limit).cloned().collect())
    }
}

// ============================================================================
// Property catalog
// ============================================================================

#[derive(Default)]
pub struct InMemoryPropertyCatalog {
    listings: RwLock<HashMap<Uuid, PropertyListing>>,
}

impl InMemoryPropertyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_listing(&self, listing: PropertyListing) {
        self.listings.write().await.insert(listing.property_id, listing);
    }
}

#[async_trait]
impl PropertyCatalog for InMemoryPropertyCatalog {
    async fn get_listing(&self, property_id: Uuid) -> Result<Option<PropertyListing>, StoreError> {
        Ok(self.listings.read().await.get(&property_id).cloned())
    }
}
