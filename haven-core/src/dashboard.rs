use haven_domain::{Booking, BookingError, BookingStatus, BookingStore};
use serde::Serialize;
use std::sync::Arc;

use crate::service::BookingScope;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub pending: u64,
    pub accepted: u64,
    pub cancelled: u64,
    pub completed: u64,
    /// Sum of `totalPrice` over ACCEPTED bookings, minor units.
    pub revenue: i64,
}

impl DashboardStats {
    pub fn from_bookings(bookings: &[Booking]) -> Self {
        bookings.iter().fold(Self::default(), |mut stats, booking| {
            match booking.status {
                BookingStatus::Pending => stats.pending += 1,
                BookingStatus::Accepted => {
                    stats.accepted += 1;
                    stats.revenue = stats.revenue.saturating_add(booking.total_price);
                }
                BookingStatus::Cancelled => stats.cancelled += 1,
                BookingStatus::Completed => stats.completed += 1,
            }
            stats
        })
    }
}

/// Summary counts over the local replica; may lag the other side by the
/// log propagation delay.
pub struct DashboardAggregator {
    store: Arc<dyn BookingStore>,
}

impl DashboardAggregator {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    pub async fn stats(&self, scope: &BookingScope) -> Result<DashboardStats, BookingError> {
        let bookings = scope.load(self.store.as_ref()).await?;
        Ok(DashboardStats::from_bookings(&bookings))
    }
}
