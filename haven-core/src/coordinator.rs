use haven_domain::{
    Booking, BookingError, BookingEvent, BookingEventType, BookingStore, Clock, EventLog, LogError,
    ServiceRole, StoreError,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// A local change that must be announced on the log before it counts.
#[derive(Debug, Clone)]
pub enum LocalMutation {
    /// Atomic check-and-insert of a new booking.
    Create(Booking),
    /// Compare-and-set of status from `before.status` to `after.status`.
    Transition { before: Booking, after: Booking },
}

impl LocalMutation {
    fn booking(&self) -> &Booking {
        match self {
            LocalMutation::Create(booking) => booking,
            LocalMutation::Transition { after, .. } => after,
        }
    }
}

/// Applies a local mutation and publishes the matching event as one unit.
/// If the publish fails or times out, the mutation is reverted before the
/// error is returned.
pub struct Coordinator {
    store: Arc<dyn BookingStore>,
    log: Arc<dyn EventLog>,
    role: ServiceRole,
    publish_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn BookingStore>,
        log: Arc<dyn EventLog>,
        role: ServiceRole,
        publish_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, log, role, publish_timeout, clock }
    }

    pub async fn execute(
        &self,
        mutation: LocalMutation,
        event_type: BookingEventType,
    ) -> Result<Booking, BookingError> {
        let applied = self.apply(&mutation).await?;

        let event = BookingEvent::new(event_type, applied.clone(), self.role, self.clock.now());
        if let Err(e) = self.announce(&event).await {
            warn!(
                booking_id = %applied.id,
                event_type = %event_type,
                error = %e,
                "Publish failed, reverting local mutation"
            );
            self.compensate(&mutation).await;
            return Err(e.into());
        }

        info!(booking_id = %applied.id, event_type = %event_type, status = %applied.status, "Booking change committed");
        Ok(applied)
    }

    async fn apply(&self, mutation: &LocalMutation) -> Result<Booking, BookingError> {
        match mutation {
            LocalMutation::Create(booking) => {
                self.store
                    .insert_if_available(booking)
                    .await
                    .map_err(|e| match e {
                        StoreError::AvailabilityConflict { conflicting_id } => {
                            BookingError::AvailabilityConflict {
                                property_id: booking.property_id,
                                conflicting_id,
                            }
                        }
                        other => other.into(),
                    })?;
                Ok(booking.clone())
            }
            LocalMutation::Transition { before, after } => self
                .store
                .compare_and_set_status(before.id, before.status, after.status, after.updated_at)
                .await
                .map_err(|e| match e {
                    // Someone else moved it since we read it
                    StoreError::StatusMismatch { actual, .. } => BookingError::InvalidTransition {
                        from: actual,
                        to: after.status,
                    },
                    other => other.into(),
                }),
        }
    }

    async fn announce(&self, event: &BookingEvent) -> Result<(), LogError> {
        let payload = event.encode()?;
        let topic = event.event_type.topic();

        match tokio::time::timeout(self.publish_timeout, self.log.publish(topic, &event.key(), &payload)).await {
            Ok(result) => result,
            Err(_) => Err(LogError::Timeout(self.publish_timeout)),
        }
    }

    async fn compensate(&self, mutation: &LocalMutation) {
        let booking_id = mutation.booking().id;

        let result = match mutation {
            // Never announced, so it never existed
            LocalMutation::Create(booking) => self.store.remove(booking.id).await,
            LocalMutation::Transition { before, after } => self
                .store
                .compare_and_set_status(before.id, after.status, before.status, self.clock.now())
                .await
                .map(|_| ()),
        };

        match result {
            Ok(()) => info!(booking_id = %booking_id, "Local mutation reverted"),
            Err(e) => error!(
                booking_id = %booking_id,
                error = %e,
                "Compensation failed; local replica diverges from the log and needs reconciliation"
            ),
        }
    }
}
