//! Subscription context
//!
//! Per-connection information carried by the delivery loop for logging and
//! statistics.

use crate::registry::{EnvironmentId, SubscriptionId};
use crate::stats::DeliveryStats;

/// Context of one live subscription
#[derive(Debug, Clone)]
pub struct SubscriptionContext {
    /// Unique subscription ID
    pub subscription_id: SubscriptionId,

    /// Environment the subscription is scoped to
    pub environment_id: EnvironmentId,

    /// Correlation id of the request that opened the stream
    pub correlation_id: Option<String>,

    /// Current delivery statistics
    pub stats: DeliveryStats,
}

impl SubscriptionContext {
    /// Create a new context
    pub fn new(subscription_id: SubscriptionId, environment_id: EnvironmentId) -> Self {
        Self {
            subscription_id,
            environment_id,
            correlation_id: None,
            stats: DeliveryStats::default(),
        }
    }

    /// Attach the correlation id of the opening request
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Correlation id, or `-` when none was recorded
    pub fn correlation(&self) -> &str {
        self.correlation_id.as_deref().unwrap_or("-")
    }
}
