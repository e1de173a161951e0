use haven_core::{BookingService, CompletionSweeper, ProjectionWorker, Projector, RetryPolicy};
use haven_domain::{Clock, DeadLetterStore, EventLog};
use haven_infra::config::{CompletionConfig, ProjectorConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

/// Starts the consumer loop for this deployment's inbound topic and the
/// completion sweeper. Both stop when `shutdown` fires.
#[allow(clippy::too_many_arguments)]
pub fn start_background_tasks(
    service: Arc<BookingService>,
    log: Arc<dyn EventLog>,
    dead_letters: Arc<dyn DeadLetterStore>,
    clock: Arc<dyn Clock>,
    group: String,
    projector: &ProjectorConfig,
    completion: &CompletionConfig,
    shutdown: &broadcast::Sender<()>,
) -> Vec<JoinHandle<()>> {
    let role = service.role();
    let topic = role.inbound_topic();
    info!(role = %role, topic, group = %group, "Starting background tasks");

    let worker = ProjectionWorker::new(
        log,
        Projector::new(service.store()),
        dead_letters,
        clock,
        topic,
        group,
        RetryPolicy::new(projector.max_attempts, Duration::from_millis(projector.retry_backoff_ms)),
        Duration::from_millis(projector.reconnect_delay_ms),
    );
    let sweeper = CompletionSweeper::new(service, Duration::from_secs(completion.sweep_interval_secs));

    vec![
        tokio::spawn(worker.run(shutdown.subscribe())),
        tokio::spawn(sweeper.run(shutdown.subscribe())),
    ]
}
