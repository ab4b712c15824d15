//! Cardinal Gateway
//!
//! The HTTP side of the Cardinal module host:
//!
//! - [`router`]: [`DynamicRouter`], the axum-backed Router Surface module
//!   route groups are attached to
//! - [`server`]: app assembly and the [`CardinalServer`] lifecycle
//! - [`handlers`]: health, introspection and module admin endpoints
//! - [`config`]: layered server configuration
//! - [`logging`]: tracing subscriber setup

pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod router;
pub mod server;
pub mod signal;
pub mod state;

pub use config::{CardinalConfig, ConfigOverrides, WatchSettings};
pub use error::{GatewayError, GatewayResult, ServerError, ServerResult};
pub use router::DynamicRouter;
pub use server::{CardinalServer, build_app};
pub use state::AppState;
