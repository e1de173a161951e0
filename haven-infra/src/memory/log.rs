use async_trait::async_trait;
use futures_util::stream;
use haven_domain::{Ack, Delivery, EventLog, EventStream, LogError};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

const DEFAULT_PARTITIONS: usize = 3;

struct Record {
    key: String,
    payload: Vec<u8>,
}

#[derive(Default)]
struct LogState {
    /// topic -> partitions -> records; offset is the index
    topics: HashMap<String, Vec<Vec<Record>>>,
    /// (group, topic) -> next offset to read, per partition
    committed: HashMap<(String, String), Vec<i64>>,
}

fn lock(state: &Mutex<LogState>) -> MutexGuard<'_, LogState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Partitioned, append-only log kept in memory. Same contract as the Kafka
/// client: per-key ordering, manual acks, redelivery from the last committed
/// offset after a resubscribe.
pub struct InMemoryEventLog {
    partitions: usize,
    state: Arc<Mutex<LogState>>,
    notify: Arc<Notify>,
    available: AtomicBool,
    latency_ms: AtomicU64,
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITIONS)
    }
}

impl InMemoryEventLog {
    pub fn new(partitions: usize) -> Self {
        Self {
            partitions: partitions.max(1),
            state: Arc::new(Mutex::new(LogState::default())),
            notify: Arc::new(Notify::new()),
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Simulates a broker outage: publishes and new subscriptions fail.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay applied after a record is appended and before `publish` returns.
    pub fn set_publish_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Resets a group's committed offsets so the topic is replayed from the start.
    pub fn rewind(&self, group: &str, topic: &str) {
        let mut state = lock(&self.state);
        state
            .committed
            .insert((group.to_string(), topic.to_string()), vec![0; self.partitions]);
    }

    /// Every payload on the topic, partition by partition.
    pub fn records(&self, topic: &str) -> Vec<Vec<u8>> {
        let state = lock(&self.state);
        state
            .topics
            .get(topic)
            .map(|partitions| {
                partitions
                    .iter()
                    .flat_map(|records| records.iter().map(|r| r.payload.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions as u64) as usize
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), LogError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(LogError::Unavailable("broker unreachable".to_string()));
        }

        let partition = self.partition_for(key);
        {
            let mut state = lock(&self.state);
            let partitions = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| (0..self.partitions).map(|_| Vec::new()).collect());
            partitions[partition].push(Record { key: key.to_string(), payload: payload.to_vec() });
        }
        self.notify.notify_waiters();

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<EventStream, LogError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(LogError::Unavailable("broker unreachable".to_string()));
        }

        let positions = {
            let mut state = lock(&self.state);
            state
                .committed
                .entry((group.to_string(), topic.to_string()))
                .or_insert_with(|| vec![0; self.partitions])
                .clone()
        };

        let cursor = Cursor {
            topic: topic.to_string(),
            group: group.to_string(),
            positions,
            next_partition: 0,
            pending: None,
            state: self.state.clone(),
            notify: self.notify.clone(),
        };

        let stream = stream::unfold(cursor, |mut cursor| async move {
            // One delivery in flight; a released delivery ends the subscription
            if let Some(pending) = cursor.pending.take() {
                if pending.await.is_err() {
                    return None;
                }
            }

            let notify = cursor.notify.clone();
            loop {
                let notified = notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(delivery) = cursor.next_delivery() {
                    return Some((Ok(delivery), cursor));
                }
                notified.await;
            }
        });

        Ok(Box::pin(stream))
    }
}

struct Cursor {
    topic: String,
    group: String,
    positions: Vec<i64>,
    next_partition: usize,
    pending: Option<oneshot::Receiver<()>>,
    state: Arc<Mutex<LogState>>,
    notify: Arc<Notify>,
}

impl Cursor {
    fn next_delivery(&mut self) -> Option<Delivery> {
        let state = lock(&self.state);
        let partitions = state.topics.get(&self.topic)?;
        let count = self.positions.len();

        for step in 0..count {
            let partition = (self.next_partition + step) % count;
            let offset = self.positions[partition];
            let Some(record) = usize::try_from(offset).ok().and_then(|i| partitions[partition].get(i)) else {
                continue;
            };

            self.positions[partition] = offset + 1;
            self.next_partition = partition + 1;

            let (ack_tx, ack_rx) = oneshot::channel();
            self.pending = Some(ack_rx);

            let committed = self.state.clone();
            let group_key = (self.group.clone(), self.topic.clone());
            let ack = Ack::new(move || {
                let mut state = lock(&committed);
                if let Some(offsets) = state.committed.get_mut(&group_key) {
                    offsets[partition] = offsets[partition].max(offset + 1);
                }
                let _ = ack_tx.send(());
            });

            return Some(Delivery::new(
                self.topic.clone(),
                Some(record.key.clone()),
                partition as i32,
                offset,
                record.payload.clone(),
                ack,
            ));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    async fn next(stream: &mut EventStream) -> Delivery {
        tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("delivery within a second")
            .expect("stream open")
            .expect("no log error")
    }

    #[tokio::test]
    async fn test_per_key_order_is_preserved() {
        let log = InMemoryEventLog::new(4);
        for i in 0..5u8 {
            log.publish("t", "booking-a", &[i]).await.unwrap();
            log.publish("t", "booking-b", &[100 + i]).await.unwrap();
        }

        let mut stream = log.subscribe("t", "g").await.unwrap();
        let mut a = Vec::new();
        let mut b = Vec::new();
        for _ in 0..10 {
            let delivery = next(&mut stream).await;
            match delivery.key.as_deref() {
                Some("booking-a") => a.push(delivery.payload[0]),
                _ => b.push(delivery.payload[0]),
            }
            delivery.commit();
        }

        assert_eq!(a, vec![0, 1, 2, 3, 4]);
        assert_eq!(b, vec![100, 101, 102, 103, 104]);
    }

    #[tokio::test]
    async fn test_unacked_delivery_is_redelivered_after_resubscribe() {
        let log = InMemoryEventLog::default();
        log.publish("t", "k", b"first").await.unwrap();
        log.publish("t", "k", b"second").await.unwrap();

        let mut stream = log.subscribe("t", "g").await.unwrap();
        next(&mut stream).await.commit();
        let released = next(&mut stream).await;
        assert_eq!(released.payload, b"second");
        drop(released);
        // The released delivery closes the subscription
        assert!(stream.next().await.is_none());

        let mut stream = log.subscribe("t", "g").await.unwrap();
        assert_eq!(next(&mut stream).await.payload, b"second");
    }

    #[tokio::test]
    async fn test_groups_track_offsets_independently() {
        let log = InMemoryEventLog::default();
        log.publish("t", "k", b"one").await.unwrap();

        let mut owner = log.subscribe("t", "owner").await.unwrap();
        next(&mut owner).await.commit();

        let mut other = log.subscribe("t", "other").await.unwrap();
        assert_eq!(next(&mut other).await.payload, b"one");
    }

    #[tokio::test]
    async fn test_subscriber_wakes_on_publish() {
        let log = Arc::new(InMemoryEventLog::default());
        let mut stream = log.subscribe("t", "g").await.unwrap();

        let publisher = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish("t", "k", b"late").await.unwrap();
        });

        assert_eq!(next(&mut stream).await.payload, b"late");
    }

    #[tokio::test]
    async fn test_rewind_replays_from_start() {
        let log = InMemoryEventLog::default();
        log.publish("t", "k", b"one").await.unwrap();

        let mut stream = log.subscribe("t", "g").await.unwrap();
        next(&mut stream).await.commit();
        drop(stream);

        log.rewind("g", "t");
        let mut stream = log.subscribe("t", "g").await.unwrap();
        assert_eq!(next(&mut stream).await.payload, b"one");
    }

    #[tokio::test]
    async fn test_outage_rejects_publish() {
        let log = InMemoryEventLog::default();
        log.set_available(false);
        assert!(matches!(log.publish("t", "k", b"x").await, Err(LogError::Unavailable(_))));
        assert!(log.records("t").is_empty());

        log.set_available(true);
        log.publish("t", "k", b"x").await.unwrap();
        assert_eq!(log.records("t").len(), 1);
    }
}
