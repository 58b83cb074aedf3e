//! Registry error types

use thiserror::Error;

use super::subscription::SubscriptionId;

/// Error type for registry operations
///
/// Every variant is fatal to the affected subscription and always logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A subscription with the same identity is already registered
    #[error("Duplicate subscription id: {0}")]
    DuplicateSubscription(SubscriptionId),

    /// The subscription was already closed when registration was attempted
    #[error("Subscription already closed: {0}")]
    AlreadyClosed(SubscriptionId),

    /// The server is shutting down and accepts no new subscriptions
    #[error("Registry is shutting down")]
    ShuttingDown,
}
