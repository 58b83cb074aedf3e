//! Mutation layer: commit, then publish
//!
//! Every feature mutation commits on the store first and only then hands one
//! event per affected environment to the broadcaster. Commit and publish run
//! under one short ordering lock so subscribers see events in commit order.

use std::sync::Arc;

use parking_lot::Mutex;

use super::error::StoreError;
use super::memory::MemoryFeatureStore;
use super::model::{
    CreateEnvironmentRequest, CreateFeatureRequest, CreateProjectRequest, Environment, Feature,
    Project, UpdateFeatureRequest,
};
use crate::registry::{Broadcaster, Event, EventKind, PublishReport};

/// Feature mutations wired to the broadcaster
pub struct FeatureService {
    store: Arc<MemoryFeatureStore>,
    broadcaster: Broadcaster,
    /// Serializes commit+publish; never held across an `.await`
    order: Mutex<()>,
}

impl FeatureService {
    pub fn new(store: Arc<MemoryFeatureStore>, broadcaster: Broadcaster) -> Self {
        Self {
            store,
            broadcaster,
            order: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<MemoryFeatureStore> {
        &self.store
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn create_project(&self, request: &CreateProjectRequest) -> Result<Project, StoreError> {
        self.store.create_project(request)
    }

    /// Create an environment. No subscriber can exist for it yet, so nothing
    /// is published.
    pub fn create_environment(
        &self,
        project_id: &str,
        request: &CreateEnvironmentRequest,
    ) -> Result<Environment, StoreError> {
        let _order = self.order.lock();
        self.store.create_environment(project_id, request)
    }

    /// Create a feature in every environment of a project and publish one
    /// `feature_created` per environment
    pub fn create_feature(
        &self,
        project_id: &str,
        request: &CreateFeatureRequest,
    ) -> Result<Vec<Feature>, StoreError> {
        let _order = self.order.lock();
        let created = self.store.create_feature(project_id, request)?;
        for feature in &created {
            self.publish(EventKind::FeatureCreated, feature);
        }
        Ok(created)
    }

    /// Update a feature in one environment and publish `feature_updated`
    pub fn update_feature(
        &self,
        environment_id: &str,
        feature_id: &str,
        request: &UpdateFeatureRequest,
    ) -> Result<Feature, StoreError> {
        let _order = self.order.lock();
        let updated = self.store.update_feature(environment_id, feature_id, request)?;
        self.publish(EventKind::FeatureUpdated, &updated);
        Ok(updated)
    }

    /// Soft-delete a feature in one environment and publish `feature_deleted`
    /// carrying the tombstone
    pub fn delete_feature(&self, environment_id: &str, feature_id: &str) -> Result<Feature, StoreError> {
        let _order = self.order.lock();
        let deleted = self.store.delete_feature(environment_id, feature_id)?;
        self.publish(EventKind::FeatureDeleted, &deleted);
        Ok(deleted)
    }

    fn publish(&self, kind: EventKind, feature: &Feature) -> Option<PublishReport> {
        match Event::feature(kind, feature) {
            Ok(event) => Some(self.broadcaster.publish(event)),
            Err(e) => {
                // The change is committed; subscribers converge on reconnect
                tracing::error!(
                    feature_id = %feature.id,
                    environment = %feature.environment_id,
                    kind = %kind,
                    error = %e,
                    "Failed to serialize change event"
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for FeatureService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureService")
            .field("store", &self.store)
            .field("broadcaster", &self.broadcaster)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{EnvironmentId, SubscriberRegistry};

    struct Fixture {
        registry: Arc<SubscriberRegistry>,
        service: FeatureService,
        project: Project,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(SubscriberRegistry::new());
        let service = FeatureService::new(
            Arc::new(MemoryFeatureStore::new()),
            Broadcaster::new(Arc::clone(&registry)),
        );
        let project = service
            .create_project(&CreateProjectRequest { name: "shop".into() })
            .unwrap();
        Fixture {
            registry,
            service,
            project,
        }
    }

    fn env(fx: &Fixture, name: &str) -> Environment {
        fx.service
            .create_environment(&fx.project.id, &CreateEnvironmentRequest { name: name.into() })
            .unwrap()
    }

    fn create(fx: &Fixture, name: &str) -> Vec<Feature> {
        fx.service
            .create_feature(
                &fx.project.id,
                &CreateFeatureRequest {
                    name: name.into(),
                    description: None,
                },
            )
            .unwrap()
    }

    #[test]
    fn test_create_publishes_per_environment() {
        let fx = fixture();
        let prod = env(&fx, "production");
        let staging = env(&fx, "staging");

        let prod_sub = fx
            .registry
            .register(fx.registry.new_subscription(EnvironmentId::from(prod.id.as_str())))
            .unwrap();
        let staging_sub = fx
            .registry
            .register(fx.registry.new_subscription(EnvironmentId::from(staging.id.as_str())))
            .unwrap();

        create(&fx, "checkout");

        for handle in [&prod_sub, &staging_sub] {
            let event = handle.subscription().try_next_event().unwrap();
            assert_eq!(event.kind, EventKind::FeatureCreated);
            assert_eq!(event.environment_id, *handle.subscription().environment_id());
            assert!(handle.subscription().try_next_event().is_none());
        }
    }

    #[test]
    fn test_update_and_delete_publish_in_commit_order() {
        let fx = fixture();
        let prod = env(&fx, "production");
        let id = create(&fx, "checkout")[0].id.clone();

        let handle = fx
            .registry
            .register(fx.registry.new_subscription(EnvironmentId::from(prod.id.as_str())))
            .unwrap();

        fx.service
            .update_feature(
                &prod.id,
                &id,
                &UpdateFeatureRequest {
                    enabled: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        fx.service.delete_feature(&prod.id, &id).unwrap();

        let sub = handle.subscription();
        let updated = sub.try_next_event().unwrap();
        let deleted = sub.try_next_event().unwrap();
        assert_eq!(updated.kind, EventKind::FeatureUpdated);
        assert_eq!(deleted.kind, EventKind::FeatureDeleted);
        assert!(updated.sequence < deleted.sequence);

        let tombstone: Feature = serde_json::from_slice(&deleted.payload).unwrap();
        assert!(tombstone.is_deleted());
        assert_eq!(tombstone.revision, 3);
    }

    #[test]
    fn test_failed_mutation_publishes_nothing() {
        let fx = fixture();
        let prod = env(&fx, "production");
        let handle = fx
            .registry
            .register(fx.registry.new_subscription(EnvironmentId::from(prod.id.as_str())))
            .unwrap();

        let err = fx.service.delete_feature(&prod.id, "missing").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(handle.subscription().pending(), 0);
        assert_eq!(fx.registry.metrics().snapshot().events_published, 0);
    }
}
