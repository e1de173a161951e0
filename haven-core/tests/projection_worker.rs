use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use haven_core::{ProjectionWorker, Projector, RetryPolicy};
use haven_domain::{
    Booking, BookingEvent, BookingEventType, BookingStatus, BookingStore, DateRange, DeadLetter,
    DeadLetterStore, EventLog, FixedClock, PropertyListing, ServiceRole, StoreError, TOPIC_BOOKING_REQUESTED,
};
use haven_infra::{InMemoryBookingStore, InMemoryDeadLetterStore, InMemoryEventLog};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

const GROUP: &str = "haven-owner-projector";

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap()))
}

fn requested(start: u32, end: u32) -> BookingEvent {
    let listing = PropertyListing {
        property_id: Uuid::new_v4(),
        owner_id: "owner-1".to_string(),
        price_per_night: 10_000,
        max_guests: None,
    };
    let range = DateRange::new(
        NaiveDate::from_ymd_opt(2025, 10, start).unwrap(),
        NaiveDate::from_ymd_opt(2025, 10, end).unwrap(),
    )
    .unwrap();
    let now = Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap();
    let booking = Booking::new(&listing, "traveler-1".to_string(), range, 1, now).unwrap();
    BookingEvent::new(BookingEventType::BookingRequested, booking, ServiceRole::TravelerService, now)
}

/// Replica whose backend fails every read of one booking.
struct BrokenRowStore {
    inner: InMemoryBookingStore,
    broken: Uuid,
    reads: AtomicU32,
}

#[async_trait]
impl BookingStore for BrokenRowStore {
    async fn insert_if_available(&self, booking: &Booking) -> Result<(), StoreError> {
        self.inner.insert_if_available(booking).await
    }

    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        self.inner.insert(booking).await
    }

    async fn remove(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.remove(id).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        if id == self.broken {
            self.reads.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Backend("disk on fire".to_string()));
        }
        self.inner.get(id).await
    }

    async fn find_active_by_property(&self, property_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        self.inner.find_active_by_property(property_id).await
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Booking, StoreError> {
        self.inner.compare_and_set_status(id, expected, next, updated_at).await
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Booking>, StoreError> {
        self.inner.list_by_owner(owner_id).await
    }

    async fn list_by_traveler(&self, traveler_id: &str) -> Result<Vec<Booking>, StoreError> {
        self.inner.list_by_traveler(traveler_id).await
    }

    async fn list_due_for_completion(&self, today: NaiveDate) -> Result<Vec<Booking>, StoreError> {
        self.inner.list_due_for_completion(today).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

/// Dead-letter table that rejects its first `failures` writes.
struct FlakyDeadLetters {
    inner: InMemoryDeadLetterStore,
    failures: AtomicU32,
    writes: AtomicU32,
}

#[async_trait]
impl DeadLetterStore for FlakyDeadLetters {
    async fn record(&self, letter: &DeadLetter) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Backend("dead letter table offline".to_string()));
        }
        self.inner.record(letter).await
    }

    async fn list(&self, limit: i64) -> Result<Vec<DeadLetter>, StoreError> {
        self.inner.list(limit).await
    }
}

fn spawn_worker(
    log: Arc<InMemoryEventLog>,
    store: Arc<dyn BookingStore>,
    dead_letters: Arc<dyn DeadLetterStore>,
    max_attempts: u32,
    shutdown: &broadcast::Sender<()>,
) {
    let worker = ProjectionWorker::new(
        log,
        Projector::new(store),
        dead_letters,
        clock(),
        TOPIC_BOOKING_REQUESTED,
        GROUP,
        RetryPolicy::new(max_attempts, Duration::from_millis(5)),
        Duration::from_millis(10),
    );
    tokio::spawn(worker.run(shutdown.subscribe()));
}

async fn wait_until_present(store: &dyn BookingStore, id: Uuid) {
    for _ in 0..200 {
        if let Ok(Some(_)) = store.get(id).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("booking {} was never projected", id);
}

#[tokio::test]
async fn test_failing_projection_is_retried_then_dead_lettered() {
    let log = Arc::new(InMemoryEventLog::new(3));
    let stuck = requested(22, 25);
    let next = requested(26, 28);
    let store = Arc::new(BrokenRowStore {
        inner: InMemoryBookingStore::new(),
        broken: stuck.booking_id,
        reads: AtomicU32::new(0),
    });
    let dead_letters = Arc::new(InMemoryDeadLetterStore::new());
    let (shutdown, _) = broadcast::channel(1);

    // Both under one key so the healthy event queues behind the failing one
    let key = stuck.key();
    log.publish(TOPIC_BOOKING_REQUESTED, &key, &stuck.encode().unwrap()).await.unwrap();
    log.publish(TOPIC_BOOKING_REQUESTED, &key, &next.encode().unwrap()).await.unwrap();

    spawn_worker(log.clone(), store.clone(), dead_letters.clone(), 3, &shutdown);
    wait_until_present(&store.inner, next.booking_id).await;

    assert_eq!(store.reads.load(Ordering::SeqCst), 3);
    let letters = dead_letters.list(10).await.unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].attempts, 3);
    assert_eq!(letters[0].topic, TOPIC_BOOKING_REQUESTED);
    assert_eq!(letters[0].message_key.as_deref(), Some(key.as_str()));
    assert!(letters[0].error.contains("disk on fire"), "error was {}", letters[0].error);
    assert_eq!(BookingEvent::decode(letters[0].payload.as_bytes()).unwrap(), stuck);
    assert!(store.inner.get(stuck.booking_id).await.unwrap().is_none());

    // Acked: a restarted worker in the same group does not see it again
    let _ = shutdown.send(());
    tokio::time::sleep(Duration::from_millis(30)).await;
    let (restart, _) = broadcast::channel(1);
    spawn_worker(log.clone(), store.clone(), dead_letters.clone(), 3, &restart);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.reads.load(Ordering::SeqCst), 3);
    assert_eq!(dead_letters.list(10).await.unwrap().len(), 1);
    let _ = restart.send(());
}

#[tokio::test]
async fn test_unrecorded_dead_letter_is_redelivered() {
    let log = Arc::new(InMemoryEventLog::new(3));
    let store = Arc::new(InMemoryBookingStore::new());
    let dead_letters = Arc::new(FlakyDeadLetters {
        inner: InMemoryDeadLetterStore::new(),
        failures: AtomicU32::new(1),
        writes: AtomicU32::new(0),
    });
    let (shutdown, _) = broadcast::channel(1);

    let healthy = requested(22, 25);
    let key = healthy.key();
    log.publish(TOPIC_BOOKING_REQUESTED, &key, b"{not an event").await.unwrap();
    log.publish(TOPIC_BOOKING_REQUESTED, &key, &healthy.encode().unwrap()).await.unwrap();

    spawn_worker(log.clone(), store.clone(), dead_letters.clone(), 1, &shutdown);
    wait_until_present(&*store, healthy.booking_id).await;

    // First write failed, the delivery stayed unacked and came back
    assert_eq!(dead_letters.writes.load(Ordering::SeqCst), 2);
    let letters = dead_letters.list(10).await.unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].payload, "{not an event");
    assert_eq!(letters[0].attempts, 1);
    let _ = shutdown.send(());
}
