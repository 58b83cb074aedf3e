//! Feature store collaborator
//!
//! The session pipeline only ever reads through this trait: one snapshot per
//! new subscription. Mutations go through [`FeatureService`](super::FeatureService)
//! so that every commit is followed by exactly one publish.

use std::future::Future;

use super::error::StoreError;
use super::model::{Environment, Feature};
use crate::registry::EnvironmentId;

/// Read side of the feature store used by the session pipeline
///
/// A snapshot read and a concurrent commit must be linearizable: the
/// snapshot either fully reflects a commit or does not reflect it at all.
pub trait FeatureStore: Send + Sync {
    /// All live features of an environment, ordered by name then id
    fn list_snapshot(
        &self,
        environment_id: &EnvironmentId,
    ) -> impl Future<Output = Result<Vec<Feature>, StoreError>> + Send;

    /// Look up an environment
    fn environment(
        &self,
        environment_id: &EnvironmentId,
    ) -> impl Future<Output = Result<Environment, StoreError>> + Send;
}
