use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus, ServiceRole};
use crate::error::LogError;

/// Traveler side → owner side.
pub const TOPIC_BOOKING_REQUESTED: &str = "booking-requested";
/// Owner side → traveler side.
pub const TOPIC_BOOKING_UPDATED: &str = "booking-updated";

impl ServiceRole {
    /// The topic this side projects from.
    pub fn inbound_topic(&self) -> &'static str {
        match self {
            ServiceRole::TravelerService => TOPIC_BOOKING_UPDATED,
            ServiceRole::OwnerService => TOPIC_BOOKING_REQUESTED,
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BookingEventType {
    BookingRequested,
    BookingAccepted,
    BookingCancelled,
}

impl BookingEventType {
    /// The status a replica holds once this event has been applied.
    pub fn target_status(&self) -> BookingStatus {
        match self {
            BookingEventType::BookingRequested => BookingStatus::Pending,
            BookingEventType::BookingAccepted => BookingStatus::Accepted,
            BookingEventType::BookingCancelled => BookingStatus::Cancelled,
        }
    }

    pub fn for_transition(status: BookingStatus) -> Option<Self> {
        match status {
            BookingStatus::Accepted => Some(BookingEventType::BookingAccepted),
            BookingStatus::Cancelled => Some(BookingEventType::BookingCancelled),
            // PENDING is only announced at creation; COMPLETED is derived locally.
            BookingStatus::Pending | BookingStatus::Completed => None,
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            BookingEventType::BookingRequested => TOPIC_BOOKING_REQUESTED,
            BookingEventType::BookingAccepted | BookingEventType::BookingCancelled => TOPIC_BOOKING_UPDATED,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingEventType::BookingRequested => "booking-requested",
            BookingEventType::BookingAccepted => "booking-accepted",
            BookingEventType::BookingCancelled => "booking-cancelled",
        }
    }
}

impl fmt::Display for BookingEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookingEvent {
    pub event_id: Uuid,
    pub event_type: BookingEventType,
    pub booking_id: Uuid,
    pub booking: Booking,
    pub emitted_at: DateTime<Utc>,
    pub emitted_by: ServiceRole,
}

impl BookingEvent {
    pub fn new(
        event_type: BookingEventType,
        booking: Booking,
        emitted_by: ServiceRole,
        emitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            booking_id: booking.id,
            booking,
            emitted_at,
            emitted_by,
        }
    }

    /// Partition key: every event of one booking lands in the same partition.
    pub fn key(&self) -> String {
        self.booking_id.to_string()
    }

    pub fn encode(&self) -> Result<Vec<u8>, LogError> {
        serde_json::to_vec(self).map_err(|e| LogError::Decode(e.to_string()))
    }

    pub fn decode(payload: &[u8]) -> Result<Self, LogError> {
        let event: BookingEvent =
            serde_json::from_slice(payload).map_err(|e| LogError::Decode(e.to_string()))?;
        if event.booking_id != event.booking.id {
            return Err(LogError::Decode(format!(
                "envelope key {} does not match snapshot id {}",
                event.booking_id, event.booking.id
            )));
        }
        Ok(event)
    }
}

// ============================================================================
// Log Client Port
// ============================================================================

/// Commits a delivery's offset for its consumer group when invoked.
pub struct Ack(Option<Box<dyn FnOnce() + Send + Sync>>);

impl Ack {
    pub fn new(commit: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self(Some(Box::new(commit)))
    }

    pub fn noop() -> Self {
        Self(None)
    }

    fn commit(mut self) {
        if let Some(commit) = self.0.take() {
            commit();
        }
    }
}

/// One message handed to a consumer group. Dropping it without `commit`
/// leaves the offset where it was, so the group sees it again after resubscribing.
pub struct Delivery {
    pub topic: String,
    pub key: Option<String>,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
    ack: Ack,
}

impl Delivery {
    pub fn new(
        topic: String,
        key: Option<String>,
        partition: i32,
        offset: i64,
        payload: Vec<u8>,
        ack: Ack,
    ) -> Self {
        Self { topic, key, partition, offset, payload, ack }
    }

    pub fn commit(self) {
        self.ack.commit();
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("topic", &self.topic)
            .field("key", &self.key)
            .field("partition", &self.partition)
            .field("offset", &self.offset)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<Delivery, LogError>> + Send>>;

/// Append-only partitioned log: ordered per key, at-least-once per group.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Returns only once the record is durably appended.
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), LogError>;

    async fn subscribe(&self, topic: &str, group: &str) -> Result<EventStream, LogError>;
}
