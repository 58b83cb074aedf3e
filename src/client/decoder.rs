//! `text/event-stream` decoder
//!
//! Incrementally turns response body chunks back into [`Frame`]s. Comment
//! lines (keep-alives) are skipped, as are messages whose event name is not
//! one of the known event kinds.

use bytes::{Buf, Bytes, BytesMut};

use crate::registry::{EventKind, Frame};

/// Incremental SSE decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every frame it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(end) = find_boundary(&self.buffer) {
            let block = self.buffer.split_to(end.start);
            self.buffer.advance(end.len);
            if let Some(frame) = parse_block(&block) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Bytes held for an incomplete message
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

struct Boundary {
    start: usize,
    len: usize,
}

fn find_boundary(buf: &[u8]) -> Option<Boundary> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|start| Boundary { start, len: 2 });
    let crlf = buf
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|start| Boundary { start, len: 4 });

    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.start <= b.start { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_block(block: &[u8]) -> Option<Frame> {
    let text = std::str::from_utf8(block).ok()?;

    let mut id = 0;
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "id" => id = value.parse().unwrap_or(0),
            "event" => event = Some(value),
            "data" => data.push(value),
            _ => {}
        }
    }

    let kind = EventKind::parse(event?)?;
    Some(Frame {
        id,
        event: kind.as_str(),
        data: Bytes::from(data.join("\n")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_single_message() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"id: 4\nevent: feature_updated\ndata: {\"id\":\"f1\"}\n\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id, 4);
        assert_eq!(frames[0].kind(), Some(EventKind::FeatureUpdated));
        assert_eq!(frames[0].data_str(), "{\"id\":\"f1\"}");
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_decode_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: snapshot\nda").is_empty());
        assert!(decoder.pending() > 0);

        let frames = decoder.push(b"ta: []\nid: 1\n\nevent: feature_deleted\ndata: {}\n\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event, "snapshot");
        assert_eq!(frames[1].event, "feature_deleted");
    }

    #[test]
    fn test_keep_alive_and_unknown_events_skipped() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b":keep-alive\n\nevent: ping\ndata: x\n\r\n\r\nevent:snapshot\ndata:[]\n\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "snapshot");
        assert_eq!(frames[0].data_str(), "[]");
    }
}
