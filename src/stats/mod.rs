//! Fan-out statistics

pub mod metrics;

pub use metrics::{DeliveryStats, HubMetrics, HubStats};
