//! Broadcaster: fan-out of committed changes
//!
//! Invoked by the mutation layer once per committed change. Resolves the
//! environment's subscriptions and pushes the shared event onto each queue
//! without ever waiting on a consumer.

use std::sync::Arc;

use super::event::Event;
use super::queue::PushOutcome;
use super::store::SubscriberRegistry;
use super::subscription::CloseReason;

/// Outcome of one publish
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Sequence number assigned to the event
    pub sequence: u64,
    /// Subscriptions scoped to the event's environment
    pub matched: usize,
    /// Subscriptions the event was enqueued onto
    pub queued: usize,
    /// Older events discarded to make room (drop-oldest policy)
    pub dropped: usize,
    /// Subscriptions closed because their queue was full (close policy)
    pub closed: usize,
}

/// Publishes events to every subscription of the target environment
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
}

impl Broadcaster {
    /// Create a broadcaster over a registry
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self { registry }
    }

    /// The registry subscriptions are resolved from
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Publish a committed change
    ///
    /// Returns in bounded time regardless of consumer behavior and never
    /// fails: per-subscription problems are handled by closing that
    /// subscription only. Callers that need publish order to match commit
    /// order must serialize their calls.
    pub fn publish(&self, mut event: Event) -> PublishReport {
        event.sequence = self.registry.assign_sequence();
        let event = Arc::new(event);

        let metrics = self.registry.metrics();
        let policy = self.registry.config().overflow_policy;
        let subscriptions = self.registry.matching(&event.environment_id);

        metrics.event_published();

        let mut report = PublishReport {
            sequence: event.sequence,
            matched: subscriptions.len(),
            ..Default::default()
        };

        for sub in subscriptions {
            match sub.offer(Arc::clone(&event), policy) {
                PushOutcome::Queued => report.queued += 1,
                PushOutcome::DroppedOldest => {
                    report.queued += 1;
                    report.dropped += 1;
                    metrics.event_dropped();
                    tracing::warn!(
                        subscription_id = %sub.id(),
                        environment = %event.environment_id,
                        sequence = event.sequence,
                        "Queue full, dropped oldest event"
                    );
                }
                PushOutcome::Full => {
                    report.closed += 1;
                    metrics.overflow_close();
                    sub.begin_close(CloseReason::Overflow);
                    self.registry.deregister(sub.id());
                    tracing::warn!(
                        subscription_id = %sub.id(),
                        environment = %event.environment_id,
                        sequence = event.sequence,
                        "Queue full, closing slow subscription"
                    );
                }
                // Closed between the lookup and the push
                PushOutcome::Closed => {}
            }
        }

        metrics.events_enqueued(report.queued as u64);

        tracing::trace!(
            environment = %event.environment_id,
            kind = %event.kind,
            sequence = event.sequence,
            matched = report.matched,
            queued = report.queued,
            "Event published"
        );

        report
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("subscriptions", &self.registry.len())
            .finish()
    }
}
