use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use haven_api::{app, worker, AppState, AuthConfig};
use haven_core::BookingService;
use haven_domain::{Clock, ServiceRole, SystemClock};
use haven_infra::{
    Config, DbClient, KafkaEventLog, PostgresBookingStore, PostgresDeadLetterStore,
    PostgresPropertyCatalog,
};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "haven_api=debug,haven_core=debug,haven_infra=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    let role = ServiceRole::from(config.service.role);
    tracing::info!("Starting Haven {} on port {}", role, config.server.port);

    // Postgres: fatal if unreachable, before the listener is bound
    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    // Kafka
    let log = Arc::new(KafkaEventLog::new(&config.kafka).context("Failed to create Kafka client")?);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(PostgresBookingStore::new(db.pool.clone()));
    let catalog = Arc::new(PostgresPropertyCatalog::new(db.pool.clone()));
    let dead_letters = Arc::new(PostgresDeadLetterStore::new(db.pool.clone()));

    let service = Arc::new(BookingService::new(
        role,
        store,
        log.clone(),
        catalog,
        clock.clone(),
        config.kafka.publish_timeout(),
    ));

    let (shutdown_tx, _) = broadcast::channel(1);
    let tasks = worker::start_background_tasks(
        service.clone(),
        log,
        dead_letters,
        clock,
        config.service.consumer_group(),
        &config.projector,
        &config.completion,
        &shutdown_tx,
    );

    let app_state = AppState {
        bookings: service,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("HTTP server failed")?;

    let _ = shutdown_tx.send(());
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}
