use async_trait::async_trait;
use haven_domain::{Ack, Delivery, EventLog, EventStream, LogError};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;

/// Kafka/Redpanda-backed event log. Publishes with `acks=all` and consumes
/// with manual commits: an offset is committed only after the consumer
/// acknowledges the delivery.
#[derive(Clone)]
pub struct KafkaEventLog {
    producer: FutureProducer,
    brokers: String,
    publish_timeout: Duration,
}

impl KafkaEventLog {
    pub fn new(config: &KafkaConfig) -> Result<Self, LogError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", config.publish_timeout_ms.to_string())
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| LogError::Unavailable(format!("Failed to create producer: {}", e)))?;

        Ok(Self {
            producer,
            brokers: config.brokers.clone(),
            publish_timeout: config.publish_timeout(),
        })
    }
}

#[async_trait]
impl EventLog for KafkaEventLog {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), LogError> {
        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload);

        match self.producer.send(record, Timeout::After(self.publish_timeout)).await {
            Ok(_) => {
                debug!(topic, key, "Event appended");
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(LogError::Unavailable(e.to_string()))
            }
        }
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<EventStream, LogError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| LogError::Unavailable(format!("Failed to create consumer: {}", e)))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| LogError::Unavailable(format!("Failed to subscribe to {}: {}", topic, e)))?;

        info!(topic, group, "Subscribed to topic");

        let (tx, rx) = mpsc::channel(1);
        let topic = topic.to_string();

        tokio::spawn(async move {
            loop {
                let Some(received) = unless_closed(&tx, consumer.recv()).await else {
                    debug!(topic = %topic, "Receiver dropped while idle, leaving the group");
                    break;
                };

                let message = match received {
                    Ok(message) => message,
                    Err(e) => {
                        if tx.send(Err(LogError::Unavailable(e.to_string()))).await.is_err() {
                            break;
                        }
                        continue;
                    }
                };

                let (ack_tx, ack_rx) = oneshot::channel::<()>();
                let delivery = Delivery::new(
                    message.topic().to_string(),
                    message.key().map(|k| String::from_utf8_lossy(k).into_owned()),
                    message.partition(),
                    message.offset(),
                    message.payload().map(|p| p.to_vec()).unwrap_or_default(),
                    Ack::new(move || {
                        let _ = ack_tx.send(());
                    }),
                );

                if tx.send(Ok(delivery)).await.is_err() {
                    debug!(topic = %topic, "Receiver dropped, exiting consumer task");
                    break;
                }

                // Strictly one in flight per subscription
                if ack_rx.await.is_err() {
                    debug!(topic = %topic, "Delivery released without ack, leaving offset uncommitted");
                    break;
                }

                if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                    warn!(
                        topic = message.topic(),
                        partition = message.partition(),
                        offset = message.offset(),
                        error = %e,
                        "Failed to commit offset (message may be redelivered)"
                    );
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Resolves `next`, or `None` as soon as the subscriber side of `tx` is gone.
async fn unless_closed<T, F: Future>(tx: &mpsc::Sender<T>, next: F) -> Option<F::Output> {
    tokio::select! {
        _ = tx.closed() => None,
        output = next => Some(output),
    }
}
