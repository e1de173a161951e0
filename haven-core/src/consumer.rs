use futures_util::StreamExt;
use haven_domain::{BookingEvent, Clock, DeadLetter, DeadLetterStore, Delivery, EventLog, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::projector::Projector;

/// Ceiling for a single backoff step.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), backoff }
    }

    /// Delay after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Drives the projector from one inbound topic.
pub struct ProjectionWorker {
    log: Arc<dyn EventLog>,
    projector: Projector,
    dead_letters: Arc<dyn DeadLetterStore>,
    clock: Arc<dyn Clock>,
    topic: String,
    group: String,
    retry: RetryPolicy,
    reconnect_delay: Duration,
}

impl ProjectionWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        log: Arc<dyn EventLog>,
        projector: Projector,
        dead_letters: Arc<dyn DeadLetterStore>,
        clock: Arc<dyn Clock>,
        topic: impl Into<String>,
        group: impl Into<String>,
        retry: RetryPolicy,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            log,
            projector,
            dead_letters,
            clock,
            topic: topic.into(),
            group: group.into(),
            retry,
            reconnect_delay,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(topic = %self.topic, group = %self.group, "Projection worker started");

        loop {
            let subscribed = tokio::select! {
                _ = shutdown.recv() => break,
                subscribed = self.log.subscribe(&self.topic, &self.group) => subscribed,
            };

            match subscribed {
                Ok(mut stream) => loop {
                    tokio::select! {
                        _ = shutdown.recv() => {
                            info!(topic = %self.topic, "Projection worker stopping");
                            return;
                        }
                        next = stream.next() => match next {
                            Some(Ok(delivery)) => {
                                if let Err(e) = self.handle(delivery).await {
                                    error!(topic = %self.topic, error = %e, "Could not record dead letter, resubscribing");
                                    break;
                                }
                            }
                            Some(Err(e)) => {
                                warn!(topic = %self.topic, error = %e, "Log transport error, resubscribing");
                                break;
                            }
                            None => {
                                debug!(topic = %self.topic, "Subscription ended, resubscribing");
                                break;
                            }
                        },
                    }
                },
                Err(e) => warn!(topic = %self.topic, error = %e, "Subscribe failed"),
            }

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        info!(topic = %self.topic, "Projection worker stopped");
    }

    /// Projects one delivery, dead-lettering it if it cannot be applied, then
    /// acknowledges it. Only a failure to record the dead letter leaves the
    /// delivery unacknowledged.
    async fn handle(&self, delivery: Delivery) -> Result<(), StoreError> {
        let event = match BookingEvent::decode(&delivery.payload) {
            Ok(event) => event,
            Err(e) => {
                self.dead_letter(&delivery, e.to_string(), 1).await?;
                delivery.commit();
                return Ok(());
            }
        };

        let mut attempt = 1;
        loop {
            match self.projector.apply(&event).await {
                Ok(outcome) => {
                    debug!(
                        booking_id = %event.booking_id,
                        event_type = %event.event_type,
                        outcome = %outcome,
                        partition = delivery.partition,
                        offset = delivery.offset,
                        "Delivery projected"
                    );
                    break;
                }
                Err(e) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        booking_id = %event.booking_id,
                        attempt,
                        error = %e,
                        "Projection failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.dead_letter(&delivery, e.to_string(), attempt).await?;
                    break;
                }
            }
        }

        delivery.commit();
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: String, attempts: u32) -> Result<(), StoreError> {
        let letter = DeadLetter {
            id: Uuid::new_v4(),
            topic: delivery.topic.clone(),
            message_key: delivery.key.clone(),
            partition: delivery.partition,
            offset: delivery.offset,
            payload: String::from_utf8_lossy(&delivery.payload).into_owned(),
            error: reason,
            attempts,
            failed_at: self.clock.now(),
        };

        error!(
            topic = %letter.topic,
            partition = letter.partition,
            offset = letter.offset,
            attempts,
            error = %letter.error,
            "Dead-lettering delivery"
        );
        self.dead_letters.record(&letter).await
    }
}
