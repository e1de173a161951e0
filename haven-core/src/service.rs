use haven_domain::{
    Booking, BookingError, BookingEventType, BookingStatus, BookingStore, Clock, DateRange,
    EventLog, PropertyCatalog, ServiceRole, StoreError,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::availability::AvailabilityChecker;
use crate::coordinator::{Coordinator, LocalMutation};
use crate::dashboard::{DashboardAggregator, DashboardStats};

/// Whose bookings a read is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingScope {
    Owner(String),
    Traveler(String),
}

impl BookingScope {
    /// Newest first.
    pub(crate) async fn load(&self, store: &dyn BookingStore) -> Result<Vec<Booking>, BookingError> {
        let bookings = match self {
            BookingScope::Owner(owner_id) => store.list_by_owner(owner_id).await?,
            BookingScope::Traveler(traveler_id) => store.list_by_traveler(traveler_id).await?,
        };
        Ok(bookings)
    }
}

#[derive(Debug, Clone)]
pub struct CreateBooking {
    pub property_id: Uuid,
    pub traveler_id: String,
    pub date_range: DateRange,
    pub guests: u32,
}

/// The booking operations of one deployment, bound to its role.
pub struct BookingService {
    role: ServiceRole,
    store: Arc<dyn BookingStore>,
    catalog: Arc<dyn PropertyCatalog>,
    coordinator: Coordinator,
    availability: AvailabilityChecker,
    dashboard: DashboardAggregator,
    clock: Arc<dyn Clock>,
}

impl BookingService {
    pub fn new(
        role: ServiceRole,
        store: Arc<dyn BookingStore>,
        log: Arc<dyn EventLog>,
        catalog: Arc<dyn PropertyCatalog>,
        clock: Arc<dyn Clock>,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            role,
            coordinator: Coordinator::new(store.clone(), log, role, publish_timeout, clock.clone()),
            availability: AvailabilityChecker::new(store.clone(), clock.clone()),
            dashboard: DashboardAggregator::new(store.clone()),
            store,
            catalog,
            clock,
        }
    }

    pub fn role(&self) -> ServiceRole {
        self.role
    }

    pub fn store(&self) -> Arc<dyn BookingStore> {
        self.store.clone()
    }

    pub async fn check_availability(&self, property_id: Uuid, range: &DateRange) -> Result<bool, BookingError> {
        self.availability.is_available(property_id, range).await
    }

    pub async fn create_booking(&self, request: CreateBooking) -> Result<Booking, BookingError> {
        if self.role != ServiceRole::TravelerService {
            return Err(BookingError::Forbidden(format!("{} does not create bookings", self.role)));
        }

        request.date_range.validate(self.clock.today())?;

        let listing = self
            .catalog
            .get_listing(request.property_id)
            .await?
            .ok_or(BookingError::PropertyNotFound(request.property_id))?;

        let booking = Booking::new(
            &listing,
            request.traveler_id,
            request.date_range,
            request.guests,
            self.clock.now(),
        )?;

        self.coordinator
            .execute(LocalMutation::Create(booking), BookingEventType::BookingRequested)
            .await
    }

    pub async fn accept_booking(&self, booking_id: Uuid, owner_id: &str) -> Result<Booking, BookingError> {
        self.owner_transition(booking_id, owner_id, BookingStatus::Accepted).await
    }

    pub async fn cancel_booking(&self, booking_id: Uuid, actor_id: &str) -> Result<Booking, BookingError> {
        self.owner_transition(booking_id, actor_id, BookingStatus::Cancelled).await
    }

    async fn owner_transition(
        &self,
        booking_id: Uuid,
        actor_id: &str,
        next: BookingStatus,
    ) -> Result<Booking, BookingError> {
        if self.role != ServiceRole::OwnerService {
            return Err(BookingError::Forbidden(format!("{} may not move a booking to {}", self.role, next)));
        }

        let before = self
            .store
            .get(booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))?;

        if before.owner_id != actor_id {
            return Err(BookingError::Forbidden(format!("{} does not own booking {}", actor_id, booking_id)));
        }

        let after = before.transition(next, self.role, self.clock.now())?;
        let event_type = BookingEventType::for_transition(next)
            .ok_or(BookingError::InvalidTransition { from: before.status, to: next })?;

        self.coordinator
            .execute(LocalMutation::Transition { before, after }, event_type)
            .await
    }

    pub async fn get_booking(&self, booking_id: Uuid, user_id: &str) -> Result<Booking, BookingError> {
        let booking = self
            .store
            .get(booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))?;

        if !booking.is_party(user_id) {
            return Err(BookingError::Forbidden(format!("{} is not a party to booking {}", user_id, booking_id)));
        }
        Ok(booking)
    }

    pub async fn list_bookings(&self, scope: &BookingScope) -> Result<Vec<Booking>, BookingError> {
        scope.load(self.store.as_ref()).await
    }

    pub async fn dashboard_stats(&self, scope: &BookingScope) -> Result<DashboardStats, BookingError> {
        self.dashboard.stats(scope).await
    }

    /// Moves every ACCEPTED booking whose stay has ended to COMPLETED.
    /// Local only: each side derives completion on its own.
    pub async fn complete_elapsed(&self) -> Result<usize, BookingError> {
        let now = self.clock.now();
        let due = self.store.list_due_for_completion(now.date_naive()).await?;

        let mut completed = 0;
        for booking in due {
            let after = match booking.transition(BookingStatus::Completed, self.role, now) {
                Ok(after) => after,
                Err(e) => {
                    debug!(booking_id = %booking.id, error = %e, "Skipping completion");
                    continue;
                }
            };

            match self
                .store
                .compare_and_set_status(booking.id, booking.status, after.status, after.updated_at)
                .await
            {
                Ok(_) => completed += 1,
                Err(StoreError::StatusMismatch { actual, .. }) => {
                    debug!(booking_id = %booking.id, actual = %actual, "Booking changed before completion");
                }
                Err(e) => warn!(booking_id = %booking.id, error = %e, "Failed to complete booking"),
            }
        }

        if completed > 0 {
            info!(completed, "Completed elapsed bookings");
        }
        Ok(completed)
    }
}
