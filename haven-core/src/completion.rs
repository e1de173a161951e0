use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::service::BookingService;

/// Periodically applies the derived ACCEPTED -> COMPLETED transition.
pub struct CompletionSweeper {
    service: Arc<BookingService>,
    interval: Duration,
}

impl CompletionSweeper {
    pub fn new(service: Arc<BookingService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.interval, "Completion sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.service.complete_elapsed().await {
                        error!(error = %e, "Completion sweep failed");
                    }
                }
            }
        }

        info!("Completion sweeper stopped");
    }
}
