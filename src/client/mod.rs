//! SDK-side stream consumer
//!
//! Provides the pieces an SDK needs to follow an `/events` stream:
//! - Decoding a `text/event-stream` body back into frames
//! - Keeping a local flag set converged by applying frames idempotently

pub mod cache;
pub mod decoder;

pub use cache::{Applied, FlagCache};
pub use decoder::SseDecoder;
