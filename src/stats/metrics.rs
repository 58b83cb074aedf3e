//! Statistics and metrics for the fan-out hub

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Per-subscription delivery statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Frames written to the transport (snapshot included)
    pub frames_sent: u64,
    /// Payload bytes written to the transport
    pub bytes_sent: u64,
    /// How long the delivery loop ran
    pub duration: Duration,
}

impl DeliveryStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one written frame
    pub fn record_frame(&mut self, bytes: usize) {
        self.frames_sent += 1;
        self.bytes_sent += bytes as u64;
    }
}

/// Hub-wide counters, shared by the registry, broadcaster and sessions
#[derive(Debug)]
pub struct HubMetrics {
    started_at: Instant,
    subscriptions_opened: AtomicU64,
    subscriptions_closed: AtomicU64,
    events_published: AtomicU64,
    events_enqueued: AtomicU64,
    events_dropped: AtomicU64,
    overflow_closes: AtomicU64,
    snapshot_failures: AtomicU64,
    transport_failures: AtomicU64,
    frames_delivered: AtomicU64,
}

impl HubMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            subscriptions_opened: AtomicU64::new(0),
            subscriptions_closed: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            events_enqueued: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            overflow_closes: AtomicU64::new(0),
            snapshot_failures: AtomicU64::new(0),
            transport_failures: AtomicU64::new(0),
            frames_delivered: AtomicU64::new(0),
        }
    }

    pub fn subscription_opened(&self) {
        self.subscriptions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscription_closed(&self) {
        self.subscriptions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_enqueued(&self, count: u64) {
        self.events_enqueued.fetch_add(count, Ordering::Relaxed);
    }

    pub fn event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn overflow_close(&self) {
        self.overflow_closes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot_failure(&self) {
        self.snapshot_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transport_failure(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_delivered(&self) {
        self.frames_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> HubStats {
        let opened = self.subscriptions_opened.load(Ordering::Relaxed);
        let closed = self.subscriptions_closed.load(Ordering::Relaxed);
        HubStats {
            subscriptions_opened: opened,
            subscriptions_closed: closed,
            active_subscriptions: opened.saturating_sub(closed),
            events_published: self.events_published.load(Ordering::Relaxed),
            events_enqueued: self.events_enqueued.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            overflow_closes: self.overflow_closes.load(Ordering::Relaxed),
            snapshot_failures: self.snapshot_failures.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

impl Default for HubMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Hub-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Total subscriptions ever registered
    pub subscriptions_opened: u64,
    /// Total subscriptions deregistered
    pub subscriptions_closed: u64,
    /// Currently registered subscriptions
    pub active_subscriptions: u64,
    /// Events handed to the broadcaster
    pub events_published: u64,
    /// Event copies placed on subscription queues
    pub events_enqueued: u64,
    /// Events discarded by the drop-oldest policy
    pub events_dropped: u64,
    /// Subscriptions closed for overflowing their queue
    pub overflow_closes: u64,
    /// Subscriptions that failed to fetch their snapshot
    pub snapshot_failures: u64,
    /// Delivery loops ended by a transport error or timeout
    pub transport_failures: u64,
    /// Frames written to transports
    pub frames_delivered: u64,
    /// Seconds since the hub started
    pub uptime_secs: u64,
}
