//! Error types for the streaming server.

use thiserror::Error;

use crate::features::StoreError;
use crate::registry::{RegistryError, SubscriptionId};

/// Main error type for subscription and server operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Feature store error: {0}")]
    Store(#[from] StoreError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Subscription {0} closed before it became active")]
    SubscriptionClosed(SubscriptionId),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

/// Result type for streaming operations.
pub type Result<T> = std::result::Result<T, Error>;
