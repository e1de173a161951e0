pub mod auth;

pub use auth::{auth_middleware, CallerRole, Claims, Identity};
