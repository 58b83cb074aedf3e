//! Feature store error types

use thiserror::Error;

/// Error type for feature store operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No project with the given id
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    /// No environment with the given id
    #[error("Environment not found: {0}")]
    EnvironmentNotFound(String),

    /// No live feature with the given id in the environment
    #[error("Feature {feature_id} not found in environment {environment_id}")]
    FeatureNotFound {
        feature_id: String,
        environment_id: String,
    },

    /// Request rejected before touching the store
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The backing store could not serve the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Check if this is one of the not-found variants
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::ProjectNotFound(_)
                | StoreError::EnvironmentNotFound(_)
                | StoreError::FeatureNotFound { .. }
        )
    }
}
