//! Subscription entry and lifecycle state
//!
//! This module defines the per-connection state held in the registry.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::config::OverflowPolicy;
use super::event::{EnvironmentId, Event};
use super::queue::{EventQueue, PushOutcome};

/// Unique identifier of one subscription (never reused within a process)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Lifecycle state of a subscription
///
/// `Registering -> Active -> Closing -> Closed`. `Closing` may also be entered
/// straight from `Registering`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscriptionState {
    /// Registered and buffering events, snapshot not yet delivered
    Registering = 0,
    /// Snapshot delivered, queue draining to the transport
    Active = 1,
    /// Shutting down; new events are discarded
    Closing = 2,
    /// Deregistered, queue released
    Closed = 3,
}

impl SubscriptionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SubscriptionState::Registering,
            1 => SubscriptionState::Active,
            2 => SubscriptionState::Closing,
            _ => SubscriptionState::Closed,
        }
    }
}

/// Why a subscription stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The remote peer went away
    PeerDisconnected,
    /// Writing to the transport failed
    TransportFailed,
    /// Writing to the transport did not complete in time
    WriteTimeout,
    /// The queue overflowed under the `Close` policy
    Overflow,
    /// The server is shutting down
    Shutdown,
    /// The initial snapshot could not be fetched
    SnapshotFailed,
    /// The owning handle was dropped
    Released,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            CloseReason::PeerDisconnected => "peer disconnected",
            CloseReason::TransportFailed => "transport failed",
            CloseReason::WriteTimeout => "write timeout",
            CloseReason::Overflow => "queue overflow",
            CloseReason::Shutdown => "server shutdown",
            CloseReason::SnapshotFailed => "snapshot failed",
            CloseReason::Released => "released",
        };
        f.write_str(reason)
    }
}

/// One live connection's registration
pub struct Subscription {
    id: SubscriptionId,
    environment_id: EnvironmentId,
    queue: EventQueue,
    state: AtomicU8,
    close_reason: Mutex<Option<CloseReason>>,
}

impl Subscription {
    /// Create a subscription in the `Registering` state
    pub fn new(id: SubscriptionId, environment_id: EnvironmentId, queue_capacity: usize) -> Self {
        Self {
            id,
            environment_id,
            queue: EventQueue::new(queue_capacity),
            state: AtomicU8::new(SubscriptionState::Registering as u8),
            close_reason: Mutex::new(None),
        }
    }

    /// Subscription identity
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Environment this subscription is scoped to
    pub fn environment_id(&self) -> &EnvironmentId {
        &self.environment_id
    }

    /// Current lifecycle state
    pub fn state(&self) -> SubscriptionState {
        SubscriptionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Check if the subscription still accepts events
    pub fn is_open(&self) -> bool {
        matches!(
            self.state(),
            SubscriptionState::Registering | SubscriptionState::Active
        )
    }

    /// Number of events waiting to be delivered
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Reason recorded by the first close, if any
    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.close_reason.lock()
    }

    /// Move `Registering -> Active`
    ///
    /// Returns `false` if the subscription is no longer registering (it was
    /// closed while the snapshot was being fetched).
    pub fn activate(&self) -> bool {
        self.state
            .compare_exchange(
                SubscriptionState::Registering as u8,
                SubscriptionState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Closing` and abandon the queue
    ///
    /// Only the first caller wins and records its reason; later calls return
    /// `false`. Safe to race from the delivery loop, the connection handler and
    /// the broadcaster.
    pub fn begin_close(&self, reason: CloseReason) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= SubscriptionState::Closing as u8 {
                return false;
            }
            match self.state.compare_exchange(
                current,
                SubscriptionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        *self.close_reason.lock() = Some(reason);
        self.queue.close();
        true
    }

    /// Move to the terminal `Closed` state
    pub(crate) fn mark_closed(&self) {
        self.queue.close();
        self.state
            .store(SubscriptionState::Closed as u8, Ordering::Release);
    }

    /// Offer a published event to this subscription's queue
    ///
    /// While `Registering` nothing may be discarded: the snapshot being read
    /// may predate the dropped event, leaving a gap the client cannot see.
    /// An overflow then always reports `Full` so the subscription is closed
    /// and the client re-subscribes.
    pub(crate) fn offer(&self, event: Arc<Event>, policy: OverflowPolicy) -> PushOutcome {
        let policy = match self.state() {
            SubscriptionState::Registering => OverflowPolicy::Close,
            SubscriptionState::Active => policy,
            SubscriptionState::Closing | SubscriptionState::Closed => return PushOutcome::Closed,
        };
        self.queue.push(event, policy)
    }

    /// Wait for the next queued event; `None` once closing
    pub async fn next_event(&self) -> Option<Arc<Event>> {
        self.queue.pop().await
    }

    /// Take the next queued event without waiting
    pub fn try_next_event(&self) -> Option<Arc<Event>> {
        self.queue.try_pop()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("environment_id", &self.environment_id)
            .field("state", &self.state())
            .field("queue", &self.queue)
            .finish()
    }
}
