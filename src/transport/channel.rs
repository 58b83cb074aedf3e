//! Channel-backed transport

use tokio::sync::mpsc;

use super::{Transport, TransportError};
use crate::registry::Frame;

/// Transport writing into a bounded `mpsc` channel
///
/// Whoever holds the receiver is the peer: dropping it is a disconnect. A
/// full channel makes `send` wait, which the delivery loop bounds with its
/// write timeout.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Frame>,
}

impl ChannelTransport {
    /// Create a transport and the receiver the peer reads from
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    /// Check if the receiving side is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Transport for ChannelTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}
