//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::registry::{OverflowPolicy, RegistryConfig};

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent event streams (0 = unlimited)
    pub max_connections: usize,

    /// Per-subscription queue settings
    pub registry: RegistryConfig,

    /// Maximum time one frame write may take before the stream is dropped
    pub write_timeout: Duration,

    /// Interval between SSE keep-alive comments on idle streams
    pub keep_alive_interval: Duration,

    /// Frames buffered between the delivery loop and the response body
    pub transport_buffer: usize,

    /// Allowed CORS origins (empty = any origin)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 0, // Unlimited
            registry: RegistryConfig::default(),
            write_timeout: Duration::from_secs(10),
            keep_alive_interval: Duration::from_secs(15),
            transport_buffer: 16,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum concurrent event streams
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Replace the registry configuration
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    /// Set the per-subscription queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.registry = self.registry.queue_capacity(capacity);
        self
    }

    /// Set the queue overflow policy
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.registry = self.registry.overflow_policy(policy);
        self
    }

    /// Set write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set keep-alive interval
    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Set the transport buffer size
    pub fn transport_buffer(mut self, frames: usize) -> Self {
        self.transport_buffer = frames.max(1);
        self
    }

    /// Restrict CORS to the given origins
    pub fn cors_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cors_origins = origins.into_iter().map(Into::into).collect();
        self
    }
}
