pub mod booking_repo;
pub mod catalog_repo;
pub mod config;
pub mod database;
pub mod dead_letter_repo;
pub mod events;
pub mod memory;

pub use booking_repo::PostgresBookingStore;
pub use catalog_repo::PostgresPropertyCatalog;
pub use config::Config;
pub use database::DbClient;
pub use dead_letter_repo::PostgresDeadLetterStore;
pub use events::KafkaEventLog;
pub use memory::{InMemoryBookingStore, InMemoryDeadLetterStore, InMemoryEventLog, InMemoryPropertyCatalog};
