//! Registry configuration

/// What to do when a subscription's queue is full at publish time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Discard the oldest undelivered event and append the new one
    #[default]
    DropOldest,
    /// Close the subscription; the client reconnects and re-snapshots
    Close,
}

impl std::str::FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop-oldest" | "drop_oldest" => Ok(OverflowPolicy::DropOldest),
            "close" => Ok(OverflowPolicy::Close),
            other => Err(format!(
                "unknown overflow policy '{}', expected 'drop-oldest' or 'close'",
                other
            )),
        }
    }
}

/// Configuration for the subscriber registry and broadcaster
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum events buffered per subscription
    pub queue_capacity: usize,

    /// Policy applied when a queue is full
    pub overflow_policy: OverflowPolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            overflow_policy: OverflowPolicy::DropOldest,
        }
    }
}

impl RegistryConfig {
    /// Set the per-subscription queue capacity (at least 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the overflow policy
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert_eq!(config.queue_capacity, 256);
        assert_eq!(config.overflow_policy, OverflowPolicy::DropOldest);
    }

    #[test]
    fn test_queue_capacity_floor() {
        let config = RegistryConfig::default().queue_capacity(0);
        assert_eq!(config.queue_capacity, 1);
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("close".parse::<OverflowPolicy>(), Ok(OverflowPolicy::Close));
        assert_eq!(
            "drop-oldest".parse::<OverflowPolicy>(),
            Ok(OverflowPolicy::DropOldest)
        );
        assert!("block".parse::<OverflowPolicy>().is_err());
    }
}
