//! Connection transport
//!
//! A transport pushes framed text messages to one remote peer and reports
//! when that peer goes away. The delivery loop is written against the
//! [`Transport`] trait only; the HTTP layer plugs in a channel whose
//! receiving half becomes a Server-Sent-Events response body.

pub mod channel;
pub mod sse;

use std::future::Future;

use thiserror::Error;

pub use channel::ChannelTransport;
pub use sse::{sse_channel, SseStream};

use crate::registry::Frame;

/// Error type for transport writes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer is gone
    #[error("Transport closed")]
    Closed,

    /// The write failed for any other reason
    #[error("Transport write failed: {0}")]
    Failed(String),
}

/// Outbound half of one live connection
pub trait Transport: Send {
    /// Write one frame, flushing it to the peer
    fn send(&mut self, frame: Frame) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Resolve once the peer has disconnected
    fn closed(&self) -> impl Future<Output = ()> + Send;
}
