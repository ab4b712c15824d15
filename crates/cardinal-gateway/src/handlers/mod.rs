//! Request handlers for the host API

pub mod health;
pub mod modules;

pub use health::health_router;
pub use modules::modules_router;
