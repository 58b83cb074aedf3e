//! Subscriber registry implementation
//!
//! The central registry that tracks every live subscription and answers
//! "which subscriptions are scoped to environment X" for the broadcaster.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::config::RegistryConfig;
use super::error::RegistryError;
use super::event::EnvironmentId;
use super::subscription::{CloseReason, Subscription, SubscriptionId};
use crate::stats::HubMetrics;

#[derive(Default)]
struct RegistryInner {
    by_id: HashMap<SubscriptionId, Arc<Subscription>>,
    by_environment: HashMap<EnvironmentId, Vec<Arc<Subscription>>>,
    /// Set by `close_all(Shutdown)`; no registration succeeds afterwards
    shutting_down: bool,
}

/// Central registry for all live subscriptions
///
/// Both indexes live under one `RwLock`, so a register or deregister is
/// either entirely visible to a concurrent [`matching`](Self::matching) call
/// or not at all. The lock is never held across an `.await`.
pub struct SubscriberRegistry {
    inner: RwLock<RegistryInner>,

    /// Counter for generating subscription ids
    next_id: AtomicU64,

    /// Last event sequence handed out to the broadcaster
    last_sequence: AtomicU64,

    config: RegistryConfig,

    metrics: Arc<HubMetrics>,
}

impl SubscriberRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            next_id: AtomicU64::new(1),
            last_sequence: AtomicU64::new(0),
            config,
            metrics: Arc::new(HubMetrics::new()),
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Fan-out counters shared with the broadcaster and sessions
    pub fn metrics(&self) -> &Arc<HubMetrics> {
        &self.metrics
    }

    /// Allocate a fresh subscription identity
    pub fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Assign the next global event sequence number
    pub(crate) fn assign_sequence(&self) -> u64 {
        self.last_sequence.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Sequence number of the most recently published event
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::Acquire)
    }

    /// Create a new `Registering` subscription sized by the registry config
    pub fn new_subscription(&self, environment_id: EnvironmentId) -> Arc<Subscription> {
        Arc::new(Subscription::new(
            self.next_id(),
            environment_id,
            self.config.queue_capacity,
        ))
    }

    /// Register a subscription
    ///
    /// From the moment this returns, every publish for the subscription's
    /// environment is enqueued onto it. The returned handle owns the
    /// subscription's lifecycle: dropping it deregisters.
    pub fn register(
        self: &Arc<Self>,
        subscription: Arc<Subscription>,
    ) -> Result<SubscriptionHandle, RegistryError> {
        let id = subscription.id();
        {
            let mut inner = self.inner.write();

            if inner.shutting_down {
                tracing::warn!(subscription_id = %id, "Refusing to register during shutdown");
                subscription.begin_close(CloseReason::Shutdown);
                return Err(RegistryError::ShuttingDown);
            }

            if !subscription.is_open() {
                tracing::error!(subscription_id = %id, "Refusing to register a closed subscription");
                return Err(RegistryError::AlreadyClosed(id));
            }

            if inner.by_id.contains_key(&id) {
                tracing::error!(subscription_id = %id, "Subscription id collision");
                return Err(RegistryError::DuplicateSubscription(id));
            }

            inner.by_id.insert(id, Arc::clone(&subscription));
            inner
                .by_environment
                .entry(subscription.environment_id().clone())
                .or_default()
                .push(Arc::clone(&subscription));
        }

        self.metrics.subscription_opened();

        tracing::debug!(
            subscription_id = %id,
            environment = %subscription.environment_id(),
            "Subscription registered"
        );

        Ok(SubscriptionHandle {
            subscription,
            registry: Arc::clone(self),
        })
    }

    /// Remove a subscription
    ///
    /// Idempotent: returns `None` if it was already gone. The removed
    /// subscription ends up `Closed` with its queue released.
    pub fn deregister(&self, id: SubscriptionId) -> Option<Arc<Subscription>> {
        let removed = {
            let mut inner = self.inner.write();
            let removed = inner.by_id.remove(&id)?;

            let env = removed.environment_id();
            let now_empty = match inner.by_environment.get_mut(env) {
                Some(subs) => {
                    subs.retain(|s| s.id() != id);
                    subs.is_empty()
                }
                None => false,
            };
            if now_empty {
                inner.by_environment.remove(env);
            }
            removed
        };

        removed.begin_close(CloseReason::Released);
        removed.mark_closed();
        self.metrics.subscription_closed();

        tracing::debug!(
            subscription_id = %id,
            environment = %removed.environment_id(),
            reason = %removed.close_reason().unwrap_or(CloseReason::Released),
            "Subscription deregistered"
        );

        Some(removed)
    }

    /// Point-in-time list of subscriptions scoped to an environment
    ///
    /// Later registry changes do not affect the returned list.
    pub fn matching(&self, environment_id: &EnvironmentId) -> Vec<Arc<Subscription>> {
        self.inner
            .read()
            .by_environment
            .get(environment_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Look up a subscription by id
    pub fn get(&self, id: SubscriptionId) -> Option<Arc<Subscription>> {
        self.inner.read().by_id.get(&id).cloned()
    }

    /// Close and remove every subscription
    ///
    /// Returns the number of subscriptions closed. Delivery loops wake up on
    /// their closed queues and exit. With [`CloseReason::Shutdown`] the
    /// registry also stops accepting registrations, so no stream can open
    /// behind the sweep.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        let ids: Vec<SubscriptionId> = {
            let mut inner = self.inner.write();
            if reason == CloseReason::Shutdown {
                inner.shutting_down = true;
            }
            for sub in inner.by_id.values() {
                sub.begin_close(reason);
            }
            inner.by_id.keys().copied().collect()
        };

        let closed = ids
            .into_iter()
            .filter(|id| self.deregister(*id).is_some())
            .count();

        if closed > 0 {
            tracing::info!(closed = closed, reason = %reason, "Closed all subscriptions");
        }
        closed
    }

    /// Check if the registry has been shut down
    pub fn is_shutting_down(&self) -> bool {
        self.inner.read().shutting_down
    }

    /// Number of registered subscriptions
    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    /// Check if no subscription is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of subscriptions scoped to an environment
    pub fn subscriber_count(&self, environment_id: &EnvironmentId) -> usize {
        self.inner
            .read()
            .by_environment
            .get(environment_id)
            .map_or(0, Vec::len)
    }

    /// Number of environments with at least one subscription
    pub fn environment_count(&self) -> usize {
        self.inner.read().by_environment.len()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Owning handle of a registered subscription
///
/// Held by the connection handler. Dropping the handle closes the
/// subscription and deregisters it; every other path (delivery errors,
/// overflow, shutdown) converges on the same idempotent deregistration.
pub struct SubscriptionHandle {
    subscription: Arc<Subscription>,
    registry: Arc<SubscriberRegistry>,
}

impl SubscriptionHandle {
    /// Subscription identity
    pub fn id(&self) -> SubscriptionId {
        self.subscription.id()
    }

    /// The underlying subscription
    pub fn subscription(&self) -> &Arc<Subscription> {
        &self.subscription
    }

    /// The registry this subscription belongs to
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Close with an explicit reason and deregister
    pub fn close(&self, reason: CloseReason) {
        self.subscription.begin_close(reason);
        self.registry.deregister(self.subscription.id());
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.close(CloseReason::Released);
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("subscription", &self.subscription)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::subscription::SubscriptionState;

    fn registry() -> Arc<SubscriberRegistry> {
        Arc::new(SubscriberRegistry::new())
    }

    #[test]
    fn test_register_deregister() {
        let registry = registry();
        let env = EnvironmentId::from("env-1");

        let handle = registry
            .register(registry.new_subscription(env.clone()))
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.subscriber_count(&env), 1);

        let id = handle.id();
        drop(handle);

        assert!(registry.is_empty());
        assert_eq!(registry.subscriber_count(&env), 0);
        assert_eq!(registry.environment_count(), 0);
        assert!(registry.get(id).is_none());
    }

    #[test]
    fn test_deregister_is_idempotent() {
        let registry = registry();
        let handle = registry
            .register(registry.new_subscription("env-1".into()))
            .unwrap();
        let id = handle.id();

        let removed = registry.deregister(id).unwrap();
        assert_eq!(removed.state(), SubscriptionState::Closed);
        assert!(registry.deregister(id).is_none());

        // Dropping the handle afterwards is a no-op
        drop(handle);
        assert_eq!(registry.metrics().snapshot().subscriptions_closed, 1);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = registry();
        let sub = registry.new_subscription("env-1".into());
        let _handle = registry.register(Arc::clone(&sub)).unwrap();

        let duplicate = Arc::new(Subscription::new(sub.id(), "env-2".into(), 4));
        let result = registry.register(duplicate);
        assert!(matches!(
            result,
            Err(RegistryError::DuplicateSubscription(id)) if id == sub.id()
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_closed_subscription_rejected() {
        let registry = registry();
        let sub = registry.new_subscription("env-1".into());
        sub.begin_close(CloseReason::Shutdown);

        assert!(matches!(
            registry.register(sub),
            Err(RegistryError::AlreadyClosed(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_matching_filters_by_environment() {
        let registry = registry();
        let _a = registry.register(registry.new_subscription("env-1".into())).unwrap();
        let _b = registry.register(registry.new_subscription("env-1".into())).unwrap();
        let _c = registry.register(registry.new_subscription("env-2".into())).unwrap();

        let env1 = registry.matching(&"env-1".into());
        assert_eq!(env1.len(), 2);
        assert!(env1.iter().all(|s| s.environment_id().as_str() == "env-1"));
        assert_eq!(registry.matching(&"env-2".into()).len(), 1);
        assert!(registry.matching(&"env-3".into()).is_empty());
    }

    #[test]
    fn test_matching_is_point_in_time() {
        let registry = registry();
        let env = EnvironmentId::from("env-1");
        let first = registry.register(registry.new_subscription(env.clone())).unwrap();

        let snapshot = registry.matching(&env);
        let _second = registry.register(registry.new_subscription(env.clone())).unwrap();
        drop(first);

        // Snapshot unchanged by later registry mutations
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.matching(&env).len(), 1);
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = registry();
        let a = registry.next_id();
        let b = registry.next_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_close_all() {
        let registry = registry();
        let a = registry.register(registry.new_subscription("env-1".into())).unwrap();
        let b = registry.register(registry.new_subscription("env-2".into())).unwrap();

        assert_eq!(registry.close_all(CloseReason::Shutdown), 2);
        assert!(registry.is_empty());
        assert_eq!(a.subscription().state(), SubscriptionState::Closed);
        assert_eq!(b.subscription().close_reason(), Some(CloseReason::Shutdown));
    }

    #[test]
    fn test_register_after_shutdown_rejected() {
        let registry = registry();
        assert_eq!(registry.close_all(CloseReason::Shutdown), 0);
        assert!(registry.is_shutting_down());

        let sub = registry.new_subscription("env-1".into());
        assert!(matches!(
            registry.register(Arc::clone(&sub)),
            Err(RegistryError::ShuttingDown)
        ));
        assert!(registry.is_empty());
        assert_eq!(sub.state(), SubscriptionState::Closing);
        assert_eq!(registry.metrics().snapshot().subscriptions_opened, 0);
    }

    #[test]
    fn test_close_all_other_reason_keeps_accepting() {
        let registry = registry();
        let _a = registry.register(registry.new_subscription("env-1".into())).unwrap();

        assert_eq!(registry.close_all(CloseReason::Overflow), 1);
        assert!(!registry.is_shutting_down());
        assert!(registry.register(registry.new_subscription("env-1".into())).is_ok());
    }

    #[test]
    fn test_concurrent_register_and_deregister() {
        let registry = registry();
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let env = EnvironmentId::new(format!("env-{}", i % 2));
                        let handle = registry.register(registry.new_subscription(env)).unwrap();
                        drop(handle);
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }

        assert!(registry.is_empty());
        let stats = registry.metrics().snapshot();
        assert_eq!(stats.subscriptions_opened, 800);
        assert_eq!(stats.subscriptions_closed, 800);
    }
}
