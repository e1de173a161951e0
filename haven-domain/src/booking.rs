use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

use crate::error::BookingError;

// ============================================================================
// Status & State Machine
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Accepted => "ACCEPTED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(BookingStatus::Pending),
            "ACCEPTED" => Some(BookingStatus::Accepted),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            "COMPLETED" => Some(BookingStatus::Completed),
            _ => None,
        }
    }

    /// Active bookings hold their date range against the property.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Accepted)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    /// Legality of `self -> next`, independent of who asks for it.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Accepted)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Accepted, BookingStatus::Cancelled)
                | (BookingStatus::Accepted, BookingStatus::Completed)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which deployable emitted an event or is executing a command.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceRole {
    TravelerService,
    OwnerService,
}

impl ServiceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceRole::TravelerService => "TRAVELER_SERVICE",
            ServiceRole::OwnerService => "OWNER_SERVICE",
        }
    }

    /// Only the owner side decides; completion is derived and open to both.
    pub fn may_request(&self, next: BookingStatus) -> bool {
        match next {
            BookingStatus::Accepted | BookingStatus::Cancelled => *self == ServiceRole::OwnerService,
            BookingStatus::Completed => true,
            BookingStatus::Pending => false,
        }
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Date Range
// ============================================================================

/// Half-open stay interval `[start, end)`: the guest leaves on `end`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, BookingError> {
        let range = Self { start, end };
        range.ensure_ordered()?;
        Ok(range)
    }

    fn ensure_ordered(&self) -> Result<(), BookingError> {
        if self.start >= self.end {
            return Err(BookingError::InvalidRange(format!(
                "start {} must be before end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    /// Full input check used before any availability lookup.
    pub fn validate(&self, today: NaiveDate) -> Result<(), BookingError> {
        self.ensure_ordered()?;
        if self.start < today {
            return Err(BookingError::InvalidRange(format!(
                "start {} is in the past (today is {})",
                self.start, today
            )));
        }
        Ok(())
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn has_elapsed(&self, today: NaiveDate) -> bool {
        self.end <= today
    }
}

// ============================================================================
// Booking Aggregate
// ============================================================================

/// Catalog data snapshotted into a booking at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PropertyListing {
    pub property_id: Uuid,
    pub owner_id: String,
    /// Minor currency units.
    pub price_per_night: i64,
    pub max_guests: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub property_id: Uuid,
    pub owner_id: String,
    pub traveler_id: String,
    pub date_range: DateRange,
    pub guests: u32,
    pub price_per_night: i64,
    pub total_price: i64,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// New PENDING booking with the listing's price captured as a snapshot.
    pub fn new(
        listing: &PropertyListing,
        traveler_id: String,
        date_range: DateRange,
        guests: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, BookingError> {
        if guests == 0 {
            return Err(BookingError::Validation("guests must be at least 1".to_string()));
        }
        if let Some(max) = listing.max_guests {
            if guests > max {
                return Err(BookingError::Validation(format!(
                    "property {} accepts at most {} guests",
                    listing.property_id, max
                )));
            }
        }
        if listing.price_per_night < 0 {
            return Err(BookingError::Validation("price per night cannot be negative".to_string()));
        }
        date_range.ensure_ordered()?;

        let total_price = listing
            .price_per_night
            .checked_mul(date_range.nights())
            .ok_or_else(|| BookingError::Validation("total price overflows".to_string()))?;

        Ok(Self {
            id: Uuid::new_v4(),
            property_id: listing.property_id,
            owner_id: listing.owner_id.clone(),
            traveler_id,
            date_range,
            guests,
            price_per_night: listing.price_per_night,
            total_price,
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_party(&self, user_id: &str) -> bool {
        self.owner_id == user_id || self.traveler_id == user_id
    }

    /// An ACCEPTED stay that has ended is completed, whether or not a
    /// sweeper has recorded it yet.
    pub fn effective_status(&self, today: NaiveDate) -> BookingStatus {
        if self.status == BookingStatus::Accepted && self.date_range.has_elapsed(today) {
            BookingStatus::Completed
        } else {
            self.status
        }
    }

    /// A cancellation decided before checkout outranks a completion that a
    /// replica derived on its own after checkout.
    pub fn cancelled_before_checkout(&self) -> bool {
        self.status == BookingStatus::Cancelled && !self.date_range.has_elapsed(self.updated_at.date_naive())
    }

    /// Returns the post-transition snapshot; `self` is left untouched.
    pub fn transition(
        &self,
        next: BookingStatus,
        role: ServiceRole,
        now: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        if !self.status.can_transition_to(next) {
            return Err(BookingError::InvalidTransition { from: self.status, to: next });
        }
        if !role.may_request(next) {
            return Err(BookingError::Forbidden(format!(
                "{} may not move a booking to {}",
                role, next
            )));
        }
        if next == BookingStatus::Completed && !self.date_range.has_elapsed(now.date_naive()) {
            return Err(BookingError::InvalidTransition { from: self.status, to: next });
        }
        let effective = self.effective_status(now.date_naive());
        if next == BookingStatus::Cancelled && effective.is_terminal() {
            return Err(BookingError::InvalidTransition { from: effective, to: next });
        }

        let mut after = self.clone();
        after.status = next;
        after.updated_at = now.max(self.updated_at);
        Ok(after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn listing() -> PropertyListing {
        PropertyListing {
            property_id: Uuid::new_v4(),
            owner_id: "owner-1".to_string(),
            price_per_night: 12_500,
            max_guests: Some(4),
        }
    }

    fn pending() -> Booking {
        let now = Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap();
        let range = DateRange::new(date(2025, 10, 22), date(2025, 10, 25)).unwrap();
        Booking::new(&listing(), "traveler-1".to_string(), range, 2, now).unwrap()
    }

    #[test]
    fn test_half_open_overlap() {
        let a = DateRange::new(date(2025, 10, 22), date(2025, 10, 25)).unwrap();
        let b = DateRange::new(date(2025, 10, 24), date(2025, 10, 27)).unwrap();
        let c = DateRange::new(date(2025, 10, 25), date(2025, 10, 28)).unwrap();

        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c), "back-to-back stays must not overlap");
    }

    #[test]
    fn test_range_validation() {
        assert!(DateRange::new(date(2025, 10, 25), date(2025, 10, 25)).is_err());
        assert!(DateRange::new(date(2025, 10, 26), date(2025, 10, 25)).is_err());

        let range = DateRange::new(date(2025, 10, 22), date(2025, 10, 25)).unwrap();
        assert!(range.validate(date(2025, 10, 22)).is_ok());
        assert!(matches!(
            range.validate(date(2025, 10, 23)),
            Err(BookingError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_price_snapshot() {
        let booking = pending();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.date_range.nights(), 3);
        assert_eq!(booking.total_price, 37_500);
    }

    #[test]
    fn test_guest_limits() {
        let range = DateRange::new(date(2025, 10, 22), date(2025, 10, 25)).unwrap();
        let now = Utc::now();
        assert!(Booking::new(&listing(), "t".to_string(), range, 0, now).is_err());
        assert!(Booking::new(&listing(), "t".to_string(), range, 5, now).is_err());
    }

    #[test]
    fn test_owner_lifecycle() {
        let booking = pending();
        let now = Utc.with_ymd_and_hms(2025, 10, 2, 9, 0, 0).unwrap();

        let accepted = booking.transition(BookingStatus::Accepted, ServiceRole::OwnerService, now).unwrap();
        assert_eq!(accepted.status, BookingStatus::Accepted);
        assert_eq!(accepted.updated_at, now);
        // original snapshot untouched
        assert_eq!(booking.status, BookingStatus::Pending);

        let cancelled = accepted.transition(BookingStatus::Cancelled, ServiceRole::OwnerService, now).unwrap();
        assert!(cancelled.status.is_terminal());

        let result = cancelled.transition(BookingStatus::Accepted, ServiceRole::OwnerService, now);
        assert!(matches!(result, Err(BookingError::InvalidTransition { .. })));
    }

    #[test]
    fn test_traveler_cannot_decide() {
        let booking = pending();
        let result = booking.transition(BookingStatus::Accepted, ServiceRole::TravelerService, Utc::now());
        assert!(matches!(result, Err(BookingError::Forbidden(_))));
    }

    #[test]
    fn test_completion_requires_elapsed_range() {
        let booking = pending();
        let before = Utc.with_ymd_and_hms(2025, 10, 2, 0, 0, 0).unwrap();
        let accepted = booking.transition(BookingStatus::Accepted, ServiceRole::OwnerService, before).unwrap();

        let during = Utc.with_ymd_and_hms(2025, 10, 24, 12, 0, 0).unwrap();
        assert!(accepted.transition(BookingStatus::Completed, ServiceRole::TravelerService, during).is_err());

        let checkout = Utc.with_ymd_and_hms(2025, 10, 25, 0, 0, 0).unwrap();
        let completed = accepted.transition(BookingStatus::Completed, ServiceRole::TravelerService, checkout).unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);
    }

    #[test]
    fn test_no_cancel_after_checkout() {
        let booking = pending();
        let before = Utc.with_ymd_and_hms(2025, 10, 2, 0, 0, 0).unwrap();
        let accepted = booking.transition(BookingStatus::Accepted, ServiceRole::OwnerService, before).unwrap();

        let last_night = Utc.with_ymd_and_hms(2025, 10, 24, 22, 0, 0).unwrap();
        let cancelled = accepted.transition(BookingStatus::Cancelled, ServiceRole::OwnerService, last_night).unwrap();
        assert!(cancelled.cancelled_before_checkout());

        let checkout = Utc.with_ymd_and_hms(2025, 10, 25, 0, 0, 0).unwrap();
        assert_eq!(accepted.effective_status(checkout.date_naive()), BookingStatus::Completed);
        let result = accepted.transition(BookingStatus::Cancelled, ServiceRole::OwnerService, checkout);
        assert!(matches!(
            result,
            Err(BookingError::InvalidTransition { from: BookingStatus::Completed, to: BookingStatus::Cancelled })
        ));

        // pending stays are not completed by time alone
        assert_eq!(booking.effective_status(checkout.date_naive()), BookingStatus::Pending);
        assert!(booking.transition(BookingStatus::Cancelled, ServiceRole::OwnerService, checkout).is_ok());
    }

    #[test]
    fn test_completed_only_from_accepted() {
        assert!(!BookingStatus::Pending.can_transition_to(BookingStatus::Completed));
        assert!(!BookingStatus::Cancelled.can_transition_to(BookingStatus::Completed));
        assert!(!BookingStatus::Completed.can_transition_to(BookingStatus::Cancelled));
        assert!(!BookingStatus::Accepted.can_transition_to(BookingStatus::Pending));
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&BookingStatus::Cancelled).unwrap();
        assert_eq!(json, "\"CANCELLED\"");
        assert_eq!(BookingStatus::parse("ACCEPTED"), Some(BookingStatus::Accepted));
        assert_eq!(BookingStatus::parse("accepted"), None);
    }
}
