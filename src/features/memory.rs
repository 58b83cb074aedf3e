//! In-memory feature store
//!
//! Projects, environments and features live under one `RwLock`, so every
//! mutation is a single atomic commit and a snapshot read sees either all of
//! it or none of it.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::error::StoreError;
use super::model::{
    CreateEnvironmentRequest, CreateFeatureRequest, CreateProjectRequest, Environment, Feature,
    Project, UpdateFeatureRequest,
};
use super::store::FeatureStore;
use crate::registry::EnvironmentId;

#[derive(Default)]
struct StoreInner {
    projects: HashMap<String, Project>,
    environments: HashMap<String, Environment>,
    /// environment id -> feature id -> feature
    features: HashMap<String, HashMap<String, Feature>>,
}

impl StoreInner {
    fn project(&self, project_id: &str) -> Result<&Project, StoreError> {
        self.projects
            .get(project_id)
            .ok_or_else(|| StoreError::ProjectNotFound(project_id.to_string()))
    }

    fn environment(&self, environment_id: &str) -> Result<&Environment, StoreError> {
        self.environments
            .get(environment_id)
            .ok_or_else(|| StoreError::EnvironmentNotFound(environment_id.to_string()))
    }

    fn environments_of(&self, project_id: &str) -> Vec<Environment> {
        let mut environments: Vec<_> = self
            .environments
            .values()
            .filter(|e| e.project_id == project_id)
            .cloned()
            .collect();
        environments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        environments
    }

    fn live_feature_mut(
        &mut self,
        environment_id: &str,
        feature_id: &str,
    ) -> Result<&mut Feature, StoreError> {
        self.features
            .get_mut(environment_id)
            .and_then(|features| features.get_mut(feature_id))
            .filter(|f| !f.is_deleted())
            .ok_or_else(|| StoreError::FeatureNotFound {
                feature_id: feature_id.to_string(),
                environment_id: environment_id.to_string(),
            })
    }
}

fn require_name(name: &str) -> Result<String, StoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::InvalidInput("name must not be empty".into()));
    }
    Ok(name.to_string())
}

fn sort_features(features: &mut [Feature]) {
    features.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
}

/// Thread-safe in-memory implementation of [`FeatureStore`]
#[derive(Default)]
pub struct MemoryFeatureStore {
    inner: RwLock<StoreInner>,
}

impl MemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_project(&self, request: &CreateProjectRequest) -> Result<Project, StoreError> {
        let project = Project {
            id: Uuid::new_v4().to_string(),
            name: require_name(&request.name)?,
            created_at: Utc::now(),
        };

        self.inner
            .write()
            .projects
            .insert(project.id.clone(), project.clone());

        tracing::debug!(project_id = %project.id, name = %project.name, "Project created");
        Ok(project)
    }

    pub fn list_projects(&self) -> Vec<Project> {
        let mut projects: Vec<_> = self.inner.read().projects.values().cloned().collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        projects
    }

    pub fn get_project(&self, project_id: &str) -> Result<Project, StoreError> {
        self.inner.read().project(project_id).cloned()
    }

    /// Create an environment
    ///
    /// The environment id has the form `sdk-<uuid>` and is what SDKs connect
    /// with. Every live feature of the project is copied into the new
    /// environment, disabled and without a value.
    pub fn create_environment(
        &self,
        project_id: &str,
        request: &CreateEnvironmentRequest,
    ) -> Result<Environment, StoreError> {
        let name = require_name(&request.name)?;
        let mut inner = self.inner.write();
        let project = inner.project(project_id)?.clone();

        let environment = Environment {
            id: format!("sdk-{}", Uuid::new_v4()),
            name,
            project_id: project.id.clone(),
            created_at: Utc::now(),
        };

        // Distinct live features of the project, taken from any environment
        let mut inherited: HashMap<String, (String, Option<String>)> = HashMap::new();
        for env in inner.environments_of(&project.id) {
            if let Some(features) = inner.features.get(&env.id) {
                for f in features.values().filter(|f| !f.is_deleted()) {
                    inherited
                        .entry(f.id.clone())
                        .or_insert_with(|| (f.name.clone(), f.description.clone()));
                }
            }
        }

        let features = inherited
            .into_iter()
            .map(|(id, (name, description))| {
                let mut feature = Feature::new(
                    id.clone(),
                    name,
                    environment.id.clone(),
                    environment.name.clone(),
                    project.id.clone(),
                    project.name.clone(),
                );
                feature.description = description;
                (id, feature)
            })
            .collect();

        inner.features.insert(environment.id.clone(), features);
        inner
            .environments
            .insert(environment.id.clone(), environment.clone());

        tracing::debug!(
            project_id = %project.id,
            environment = %environment.id,
            name = %environment.name,
            "Environment created"
        );
        Ok(environment)
    }

    pub fn list_environments(&self, project_id: &str) -> Result<Vec<Environment>, StoreError> {
        let inner = self.inner.read();
        inner.project(project_id)?;
        Ok(inner.environments_of(project_id))
    }

    pub fn get_environment(&self, environment_id: &str) -> Result<Environment, StoreError> {
        self.inner.read().environment(environment_id).cloned()
    }

    /// Create a feature in every environment of the project
    ///
    /// All copies share one id and start disabled at revision 1. Returns the
    /// created copies, one per environment.
    pub fn create_feature(
        &self,
        project_id: &str,
        request: &CreateFeatureRequest,
    ) -> Result<Vec<Feature>, StoreError> {
        let name = require_name(&request.name)?;
        let mut inner = self.inner.write();
        let project = inner.project(project_id)?.clone();
        let feature_id = Uuid::new_v4().to_string();

        let mut created = Vec::new();
        for env in inner.environments_of(&project.id) {
            let mut feature = Feature::new(
                feature_id.clone(),
                name.clone(),
                env.id.clone(),
                env.name.clone(),
                project.id.clone(),
                project.name.clone(),
            );
            feature.description = request.description.clone();

            inner
                .features
                .entry(env.id.clone())
                .or_default()
                .insert(feature_id.clone(), feature.clone());
            created.push(feature);
        }

        tracing::debug!(
            project_id = %project.id,
            feature_id = %feature_id,
            environments = created.len(),
            "Feature created"
        );
        Ok(created)
    }

    pub fn get_feature(&self, environment_id: &str, feature_id: &str) -> Result<Feature, StoreError> {
        let inner = self.inner.read();
        inner.environment(environment_id)?;
        inner
            .features
            .get(environment_id)
            .and_then(|features| features.get(feature_id))
            .filter(|f| !f.is_deleted())
            .cloned()
            .ok_or_else(|| StoreError::FeatureNotFound {
                feature_id: feature_id.to_string(),
                environment_id: environment_id.to_string(),
            })
    }

    /// Live features of one environment, ordered by name then id
    pub fn list_features(&self, environment_id: &str) -> Result<Vec<Feature>, StoreError> {
        let inner = self.inner.read();
        inner.environment(environment_id)?;

        let mut features: Vec<_> = inner
            .features
            .get(environment_id)
            .map(|features| {
                features
                    .values()
                    .filter(|f| !f.is_deleted())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        sort_features(&mut features);
        Ok(features)
    }

    /// Live features of every environment of a project
    pub fn list_project_features(&self, project_id: &str) -> Result<Vec<Feature>, StoreError> {
        let inner = self.inner.read();
        inner.project(project_id)?;

        let mut features: Vec<_> = inner
            .environments_of(project_id)
            .iter()
            .filter_map(|env| inner.features.get(&env.id))
            .flat_map(|features| features.values())
            .filter(|f| !f.is_deleted())
            .cloned()
            .collect();
        features.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.id.cmp(&b.id))
                .then_with(|| a.environment_name.cmp(&b.environment_name))
        });
        Ok(features)
    }

    /// Apply an update to one feature in one environment
    pub fn update_feature(
        &self,
        environment_id: &str,
        feature_id: &str,
        request: &UpdateFeatureRequest,
    ) -> Result<Feature, StoreError> {
        let mut inner = self.inner.write();
        inner.environment(environment_id)?;
        let feature = inner.live_feature_mut(environment_id, feature_id)?;

        if let Some(enabled) = request.enabled {
            feature.enabled = enabled;
        }
        if let Some(json_value) = &request.json_value {
            feature.json_value = Some(json_value.clone());
        }
        if let Some(description) = &request.description {
            feature.description = Some(description.clone());
        }
        feature.revision += 1;
        feature.updated_at = Utc::now();

        Ok(feature.clone())
    }

    /// Soft-delete a feature in one environment
    ///
    /// Returns the tombstone: `deletedAt` set and revision bumped. The feature
    /// disappears from snapshots and listings.
    pub fn delete_feature(&self, environment_id: &str, feature_id: &str) -> Result<Feature, StoreError> {
        let mut inner = self.inner.write();
        inner.environment(environment_id)?;
        let feature = inner.live_feature_mut(environment_id, feature_id)?;

        let now = Utc::now();
        feature.deleted_at = Some(now);
        feature.updated_at = now;
        feature.revision += 1;

        Ok(feature.clone())
    }
}

impl FeatureStore for MemoryFeatureStore {
    async fn list_snapshot(&self, environment_id: &EnvironmentId) -> Result<Vec<Feature>, StoreError> {
        self.list_features(environment_id.as_str())
    }

    async fn environment(&self, environment_id: &EnvironmentId) -> Result<Environment, StoreError> {
        self.get_environment(environment_id.as_str())
    }
}

impl std::fmt::Debug for MemoryFeatureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("MemoryFeatureStore")
            .field("projects", &inner.projects.len())
            .field("environments", &inner.environments.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::JsonValue;

    fn project(store: &MemoryFeatureStore) -> Project {
        store
            .create_project(&CreateProjectRequest { name: "shop".into() })
            .unwrap()
    }

    fn environment(store: &MemoryFeatureStore, project_id: &str, name: &str) -> Environment {
        store
            .create_environment(project_id, &CreateEnvironmentRequest { name: name.into() })
            .unwrap()
    }

    fn variant() -> JsonValue {
        JsonValue {
            key: "variant".into(),
            values: vec!["a".into()],
            enabled: true,
        }
    }

    fn feature_request(name: &str) -> CreateFeatureRequest {
        CreateFeatureRequest {
            name: name.into(),
            description: None,
        }
    }

    #[test]
    fn test_environment_id_is_sdk_key() {
        let store = MemoryFeatureStore::new();
        let p = project(&store);
        let env = environment(&store, &p.id, "production");

        assert!(env.id.starts_with("sdk-"));
        assert_eq!(store.list_environments(&p.id).unwrap(), vec![env]);
    }

    #[test]
    fn test_unknown_ids() {
        let store = MemoryFeatureStore::new();
        assert_eq!(
            store.list_environments("nope"),
            Err(StoreError::ProjectNotFound("nope".into()))
        );
        assert_eq!(
            store.list_features("nope"),
            Err(StoreError::EnvironmentNotFound("nope".into()))
        );

        let p = project(&store);
        let env = environment(&store, &p.id, "production");
        let err = store.get_feature(&env.id, "missing").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_empty_name_rejected() {
        let store = MemoryFeatureStore::new();
        let err = store
            .create_project(&CreateProjectRequest { name: "  ".into() })
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[test]
    fn test_create_feature_in_every_environment() {
        let store = MemoryFeatureStore::new();
        let p = project(&store);
        let prod = environment(&store, &p.id, "production");
        let staging = environment(&store, &p.id, "staging");

        let created = store.create_feature(&p.id, &feature_request("checkout")).unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].id, created[1].id);

        for env in [&prod, &staging] {
            let features = store.list_features(&env.id).unwrap();
            assert_eq!(features.len(), 1);
            assert_eq!(features[0].environment_name, env.name);
            assert_eq!(features[0].project_name, "shop");
            assert_eq!(features[0].revision, 1);
        }
        assert_eq!(store.list_project_features(&p.id).unwrap().len(), 2);
    }

    #[test]
    fn test_new_environment_inherits_features() {
        let store = MemoryFeatureStore::new();
        let p = project(&store);
        let prod = environment(&store, &p.id, "production");
        let created = store.create_feature(&p.id, &feature_request("checkout")).unwrap();
        store
            .update_feature(
                &prod.id,
                &created[0].id,
                &UpdateFeatureRequest {
                    enabled: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();

        let staging = environment(&store, &p.id, "staging");
        let inherited = store.list_features(&staging.id).unwrap();
        assert_eq!(inherited.len(), 1);
        assert_eq!(inherited[0].id, created[0].id);
        assert!(!inherited[0].enabled);
    }

    #[test]
    fn test_update_bumps_revision() {
        let store = MemoryFeatureStore::new();
        let p = project(&store);
        let env = environment(&store, &p.id, "production");
        let id = store.create_feature(&p.id, &feature_request("checkout")).unwrap()[0]
            .id
            .clone();

        let updated = store
            .update_feature(
                &env.id,
                &id,
                &UpdateFeatureRequest {
                    enabled: Some(true),
                    json_value: Some(variant()),
                    description: None,
                },
            )
            .unwrap();

        assert!(updated.enabled);
        assert_eq!(updated.revision, 2);
        assert_eq!(updated.json_value, Some(variant()));
        assert_eq!(store.get_feature(&env.id, &id).unwrap(), updated);
    }

    #[test]
    fn test_soft_delete() {
        let store = MemoryFeatureStore::new();
        let p = project(&store);
        let prod = environment(&store, &p.id, "production");
        let staging = environment(&store, &p.id, "staging");
        let id = store.create_feature(&p.id, &feature_request("checkout")).unwrap()[0]
            .id
            .clone();

        let tombstone = store.delete_feature(&prod.id, &id).unwrap();
        assert!(tombstone.is_deleted());
        assert_eq!(tombstone.revision, 2);

        assert!(store.list_features(&prod.id).unwrap().is_empty());
        assert!(store.get_feature(&prod.id, &id).is_err());
        // Other environments keep their copy
        assert_eq!(store.list_features(&staging.id).unwrap().len(), 1);

        // Deleting or updating again is not found
        assert!(store.delete_feature(&prod.id, &id).unwrap_err().is_not_found());
        assert!(store
            .update_feature(&prod.id, &id, &UpdateFeatureRequest::default())
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_snapshot_ordered_by_name_then_id() {
        let store = MemoryFeatureStore::new();
        let p = project(&store);
        let env = environment(&store, &p.id, "production");
        for name in ["zeta", "alpha", "mid", "alpha"] {
            store.create_feature(&p.id, &feature_request(name)).unwrap();
        }

        let snapshot = store.list_features(&env.id).unwrap();
        let keys: Vec<_> = snapshot.iter().map(|f| (f.name.clone(), f.id.clone())).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(snapshot[0].name, "alpha");
    }

    #[tokio::test]
    async fn test_feature_store_trait() {
        let store = MemoryFeatureStore::new();
        let p = project(&store);
        let env = environment(&store, &p.id, "production");
        store.create_feature(&p.id, &feature_request("checkout")).unwrap();

        let id = EnvironmentId::from(env.id.as_str());
        assert_eq!(store.environment(&id).await.unwrap(), env);
        assert_eq!(store.list_snapshot(&id).await.unwrap().len(), 1);
        assert!(store
            .list_snapshot(&EnvironmentId::from("sdk-missing"))
            .await
            .is_err());
    }
}
