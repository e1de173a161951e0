use haven_domain::{BookingEvent, BookingEventType, BookingStatus, BookingStore, StoreError};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bound on re-reads when a compare-and-set loses to a local handler.
const MAX_CAS_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOutcome {
    Inserted,
    Applied,
    AlreadyApplied,
    Discarded,
}

impl fmt::Display for ProjectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectionOutcome::Inserted => "inserted",
            ProjectionOutcome::Applied => "applied",
            ProjectionOutcome::AlreadyApplied => "already-applied",
            ProjectionOutcome::Discarded => "discarded",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Booking {0} kept changing underneath the projector")]
    Contention(Uuid),
}

/// Applies log events to the local replica so that redelivery and replay
/// have no additional effect.
#[derive(Clone)]
pub struct Projector {
    store: Arc<dyn BookingStore>,
}

impl Projector {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    pub async fn apply(&self, event: &BookingEvent) -> Result<ProjectionOutcome, ProjectionError> {
        let target = event.event_type.target_status();
        if event.booking.status != target {
            warn!(
                booking_id = %event.booking_id,
                event_type = %event.event_type,
                snapshot_status = %event.booking.status,
                "Snapshot disagrees with event type, discarding"
            );
            return Ok(ProjectionOutcome::Discarded);
        }

        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(local) = self.store.get(event.booking_id).await? else {
                match self.store.insert(&event.booking).await {
                    Ok(()) => {
                        info!(booking_id = %event.booking_id, status = %target, "Projected new booking");
                        return Ok(ProjectionOutcome::Inserted);
                    }
                    Err(StoreError::DuplicateKey(_)) => {
                        info!(booking_id = %event.booking_id, "Booking inserted concurrently, treating as applied");
                        if event.event_type == BookingEventType::BookingRequested {
                            return Ok(ProjectionOutcome::AlreadyApplied);
                        }
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            };

            if local.status == target {
                debug!(booking_id = %event.booking_id, status = %target, "Event already reflected locally");
                return Ok(ProjectionOutcome::AlreadyApplied);
            }

            let overrides_completion =
                local.status == BookingStatus::Completed && event.booking.cancelled_before_checkout();
            if !local.status.can_transition_to(target) && !overrides_completion {
                warn!(
                    booking_id = %event.booking_id,
                    event_type = %event.event_type,
                    local_status = %local.status,
                    "Illegal transition from log, discarding"
                );
                return Ok(ProjectionOutcome::Discarded);
            }

            match self
                .store
                .compare_and_set_status(local.id, local.status, target, event.booking.updated_at)
                .await
            {
                Ok(_) => {
                    info!(booking_id = %event.booking_id, from = %local.status, to = %target, "Projected transition");
                    return Ok(ProjectionOutcome::Applied);
                }
                Err(StoreError::StatusMismatch { actual, .. }) => {
                    debug!(booking_id = %event.booking_id, actual = %actual, "Lost compare-and-set race, re-reading");
                }
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(ProjectionError::Contention(event.booking_id))
    }
}
