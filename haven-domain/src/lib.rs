pub mod booking;
pub mod clock;
pub mod error;
pub mod events;
pub mod repository;

pub use booking::{Booking, BookingStatus, DateRange, PropertyListing, ServiceRole};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{BookingError, LogError, StoreError};
pub use events::{
    Ack, BookingEvent, BookingEventType, Delivery, EventLog, EventStream,
    TOPIC_BOOKING_REQUESTED, TOPIC_BOOKING_UPDATED,
};
pub use repository::{BookingStore, DeadLetter, DeadLetterStore, PropertyCatalog};
