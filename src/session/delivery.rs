//! Delivery loop
//!
//! One task per subscription. Writes the snapshot first, then drains the
//! subscription's queue in arrival order. Any transport problem ends this
//! subscription only; the loop never touches another subscription's queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::context::SubscriptionContext;
use super::sequencer::OpenedSubscription;
use crate::registry::{CloseReason, Event, Frame, Subscription, SubscriptionHandle};
use crate::stats::HubMetrics;
use crate::transport::{Transport, TransportError};

/// Drains one subscription into one transport
#[derive(Debug)]
pub struct DeliveryLoop {
    handle: SubscriptionHandle,
    snapshot: Option<Event>,
    write_timeout: Duration,
    context: SubscriptionContext,
}

impl DeliveryLoop {
    /// Create a delivery loop for an opened subscription
    pub fn new(opened: OpenedSubscription, write_timeout: Duration) -> Self {
        let OpenedSubscription { handle, snapshot } = opened;
        let context =
            SubscriptionContext::new(handle.id(), handle.subscription().environment_id().clone());
        Self {
            handle,
            snapshot: Some(snapshot),
            write_timeout,
            context,
        }
    }

    /// Replace the loop's context (correlation id of the opening request)
    pub fn with_context(mut self, context: SubscriptionContext) -> Self {
        self.context = context;
        self
    }

    pub fn context(&self) -> &SubscriptionContext {
        &self.context
    }

    /// Run until the subscription closes
    ///
    /// Returns the reason the subscription ended. The subscription is always
    /// deregistered when this returns.
    pub async fn run<T: Transport>(mut self, mut transport: T) -> CloseReason {
        let subscription = Arc::clone(self.handle.subscription());
        let metrics = Arc::clone(self.handle.registry().metrics());
        let started = Instant::now();

        tracing::debug!(
            subscription_id = %self.context.subscription_id,
            environment = %self.context.environment_id,
            correlation_id = %self.context.correlation(),
            "Delivery loop started"
        );

        let ended = self.drive(&subscription, &metrics, &mut transport).await;
        self.context.stats.duration = started.elapsed();

        self.handle.close(ended);
        // An earlier close (overflow, shutdown) takes precedence
        let reason = subscription.close_reason().unwrap_or(ended);

        if matches!(reason, CloseReason::TransportFailed | CloseReason::WriteTimeout) {
            metrics.transport_failure();
        }

        tracing::info!(
            subscription_id = %self.context.subscription_id,
            environment = %self.context.environment_id,
            correlation_id = %self.context.correlation(),
            reason = %reason,
            frames = self.context.stats.frames_sent,
            bytes = self.context.stats.bytes_sent,
            duration_ms = self.context.stats.duration.as_millis() as u64,
            "Subscription closed"
        );

        reason
    }

    async fn drive<T: Transport>(
        &mut self,
        subscription: &Subscription,
        metrics: &HubMetrics,
        transport: &mut T,
    ) -> CloseReason {
        if let Some(snapshot) = self.snapshot.take() {
            if let Err(reason) = self.write(transport, snapshot.to_frame(), metrics).await {
                return reason;
            }
        }

        loop {
            let next = tokio::select! {
                event = subscription.next_event() => event,
                _ = transport.closed() => return CloseReason::PeerDisconnected,
            };

            // A closed queue means someone else ended the subscription
            let Some(event) = next else {
                return subscription.close_reason().unwrap_or(CloseReason::Released);
            };

            if let Err(reason) = self.write(transport, event.to_frame(), metrics).await {
                return reason;
            }
        }
    }

    async fn write<T: Transport>(
        &mut self,
        transport: &mut T,
        frame: Frame,
        metrics: &HubMetrics,
    ) -> Result<(), CloseReason> {
        let len = frame.data.len();
        let id = frame.id;

        match tokio::time::timeout(self.write_timeout, transport.send(frame)).await {
            Ok(Ok(())) => {
                self.context.stats.record_frame(len);
                metrics.frame_delivered();
                tracing::trace!(
                    subscription_id = %self.context.subscription_id,
                    sequence = id,
                    bytes = len,
                    "Frame delivered"
                );
                Ok(())
            }
            Ok(Err(TransportError::Closed)) => Err(CloseReason::PeerDisconnected),
            Err(_elapsed) => {
                tracing::warn!(
                    subscription_id = %self.context.subscription_id,
                    sequence = id,
                    timeout_ms = self.write_timeout.as_millis() as u64,
                    "Transport write timed out"
                );
                Err(CloseReason::WriteTimeout)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    subscription_id = %self.context.subscription_id,
                    sequence = id,
                    error = %e,
                    "Transport write failed"
                );
                Err(CloseReason::TransportFailed)
            }
        }
    }
}
