//! Server-Sent-Events framing
//!
//! Each [`Frame`] becomes one SSE message with `id`, `event` and `data`
//! fields. Keep-alive comments are interleaved while the stream is idle so
//! intermediaries do not time the connection out.

use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use axum::response::sse::{Event as SseEvent, KeepAlive, KeepAliveStream, Sse};
use futures_util::stream::{self, Stream};
use tokio::sync::mpsc;

use super::channel::ChannelTransport;
use crate::registry::Frame;

/// Boxed SSE event stream handed to axum
pub type SseStream = Pin<Box<dyn Stream<Item = Result<SseEvent, Infallible>> + Send>>;

impl From<Frame> for SseEvent {
    fn from(frame: Frame) -> Self {
        SseEvent::default()
            .id(frame.id.to_string())
            .event(frame.event)
            .data(frame.data_str())
    }
}

/// Turn a frame receiver into an SSE response
///
/// The response body ends when every sender is dropped. When the client
/// disconnects axum drops the body, which drops `rx` and closes the paired
/// transport.
pub fn sse_response(rx: mpsc::Receiver<Frame>, keep_alive: Duration) -> Sse<KeepAliveStream<SseStream>> {
    let events = stream::unfold(rx, |mut rx| async move {
        let frame = rx.recv().await?;
        Some((Ok(SseEvent::from(frame)), rx))
    });

    Sse::new(Box::pin(events) as SseStream)
        .keep_alive(KeepAlive::new().interval(keep_alive).text("keep-alive"))
}

/// Create a transport together with the SSE response that drains it
pub fn sse_channel(buffer: usize, keep_alive: Duration) -> (ChannelTransport, Sse<KeepAliveStream<SseStream>>) {
    let (transport, rx) = ChannelTransport::new(buffer);
    (transport, sse_response(rx, keep_alive))
}
