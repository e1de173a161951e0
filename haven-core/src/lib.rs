pub mod availability;
pub mod completion;
pub mod consumer;
pub mod coordinator;
pub mod dashboard;
pub mod projector;
pub mod service;

pub use availability::AvailabilityChecker;
pub use completion::CompletionSweeper;
pub use consumer::{ProjectionWorker, RetryPolicy};
pub use coordinator::{Coordinator, LocalMutation};
pub use dashboard::{DashboardAggregator, DashboardStats};
pub use projector::{ProjectionError, ProjectionOutcome, Projector};
pub use service::{BookingScope, BookingService, CreateBooking};
