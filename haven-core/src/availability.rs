use haven_domain::{BookingError, BookingStore, Clock, DateRange};
use std::sync::Arc;
use uuid::Uuid;

/// Read-only availability query. The create path does not call this; it goes
/// through the store's atomic check-and-insert.
pub struct AvailabilityChecker {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl AvailabilityChecker {
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn is_available(&self, property_id: Uuid, range: &DateRange) -> Result<bool, BookingError> {
        range.validate(self.clock.today())?;

        let active = self.store.find_active_by_property(property_id).await?;
        Ok(!active.iter().any(|existing| existing.date_range.overlaps(range)))
    }
}
