//! Snapshot sequencer
//!
//! Guarantees a new subscriber sees the snapshot first and then every change
//! committed after it. The subscription is registered *before* the snapshot
//! is read, so any commit that races with the read is either contained in
//! the snapshot or queued behind it (possibly both, which consumers absorb
//! by applying changes idempotently by id and revision).

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::features::FeatureStore;
use crate::registry::{CloseReason, EnvironmentId, Event, SubscriberRegistry, SubscriptionHandle};

/// A registered, active subscription and the snapshot it must deliver first
#[derive(Debug)]
pub struct OpenedSubscription {
    /// Owning handle; dropping it deregisters
    pub handle: SubscriptionHandle,
    /// Synthetic `snapshot` event to write before anything queued
    pub snapshot: Event,
}

/// Open a subscription to an environment
///
/// On a snapshot failure the subscription is deregistered and the store
/// error is returned; no partial stream is ever started.
pub async fn open<S>(
    registry: &Arc<SubscriberRegistry>,
    store: &S,
    environment_id: EnvironmentId,
) -> Result<OpenedSubscription>
where
    S: FeatureStore,
{
    // Registering: from here on every publish for this environment is queued
    let handle = registry.register(registry.new_subscription(environment_id.clone()))?;
    let sequence = registry.last_sequence();

    let features = match store.list_snapshot(&environment_id).await {
        Ok(features) => features,
        Err(e) => {
            registry.metrics().snapshot_failure();
            handle.close(CloseReason::SnapshotFailed);
            tracing::warn!(
                subscription_id = %handle.id(),
                environment = %environment_id,
                error = %e,
                "Snapshot fetch failed"
            );
            return Err(e.into());
        }
    };

    let snapshot = Event::snapshot(environment_id, &features, sequence)?;

    if !handle.subscription().activate() {
        tracing::debug!(
            subscription_id = %handle.id(),
            reason = ?handle.subscription().close_reason(),
            "Subscription closed while registering"
        );
        return Err(Error::SubscriptionClosed(handle.id()));
    }

    tracing::info!(
        subscription_id = %handle.id(),
        environment = %handle.subscription().environment_id(),
        features = features.len(),
        buffered = handle.subscription().pending(),
        "Subscription opened"
    );

    Ok(OpenedSubscription { handle, snapshot })
}
