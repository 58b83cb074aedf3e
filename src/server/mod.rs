//! HTTP server
//!
//! Serves the live event stream and the management API on one axum router.

pub mod config;
pub mod listener;
pub mod routes;

pub use config::ServerConfig;
pub use listener::FlagServer;
pub use routes::{AppState, ApiError, StreamState, CORRELATION_ID_HEADER};
