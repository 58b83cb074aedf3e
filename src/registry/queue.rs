//! Bounded per-subscription event queue
//!
//! Publishers push without ever waiting; the single consumer (the delivery
//! loop) waits on a `Notify` while the queue is empty. When the queue is full
//! the configured [`OverflowPolicy`] decides between discarding the oldest
//! event and refusing the push so the caller can close the subscription.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::config::OverflowPolicy;
use super::event::Event;

/// Result of pushing an event onto a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended without loss
    Queued,
    /// Appended after discarding the oldest pending event
    DroppedOldest,
    /// Queue is full and the policy asks for the subscription to be closed
    Full,
    /// Queue is closed; the event was discarded
    Closed,
}

struct QueueInner {
    events: VecDeque<Arc<Event>>,
    closed: bool,
}

/// FIFO of pending events owned by exactly one subscription
pub struct EventQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    capacity: usize,
}

impl EventQueue {
    /// Create an empty queue holding at most `capacity` events
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(QueueInner {
                events: VecDeque::with_capacity(capacity.min(64)),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Push an event. Never blocks on the consumer.
    pub fn push(&self, event: Arc<Event>, policy: OverflowPolicy) -> PushOutcome {
        let outcome = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return PushOutcome::Closed;
            }

            let outcome = if inner.events.len() >= self.capacity {
                match policy {
                    OverflowPolicy::DropOldest => {
                        inner.events.pop_front();
                        PushOutcome::DroppedOldest
                    }
                    OverflowPolicy::Close => return PushOutcome::Full,
                }
            } else {
                PushOutcome::Queued
            };

            inner.events.push_back(event);
            outcome
        };

        self.notify.notify_one();
        outcome
    }

    /// Wait for the next event
    ///
    /// Returns `None` once the queue is closed. Pending events are abandoned
    /// on close, so a closed queue never yields anything again.
    pub async fn pop(&self) -> Option<Arc<Event>> {
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return None;
                }
                if let Some(event) = inner.events.pop_front() {
                    return Some(event);
                }
            }

            // A push between the check above and this await leaves a permit
            // behind, so the wake-up is not lost.
            self.notify.notified().await;
        }
    }

    /// Take the next event without waiting
    pub fn try_pop(&self) -> Option<Arc<Event>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        inner.events.pop_front()
    }

    /// Close the queue, discarding pending events
    ///
    /// Returns the number of events discarded. Closing twice is a no-op.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return 0;
            }
            inner.closed = true;
            let discarded = inner.events.len();
            inner.events.clear();
            discarded
        };

        self.notify.notify_one();
        discarded
    }

    /// Check if the queue has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    /// Check if no events are pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of pending events
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("EventQueue")
            .field("len", &inner.events.len())
            .field("capacity", &self.capacity)
            .field("closed", &inner.closed)
            .finish()
    }
}
