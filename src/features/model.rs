//! Projects, environments and feature flags

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured value attached to a feature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonValue {
    pub key: String,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub enabled: bool,
}

/// State of one feature in one environment
///
/// The same feature id exists once per environment of its project; each
/// copy carries its own `enabled` bit, value and revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_value: Option<JsonValue>,
    /// Starts at 1, bumped on every committed mutation
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub environment_id: String,
    pub environment_name: String,
    pub project_id: String,
    pub project_name: String,
}

impl Feature {
    /// Create a disabled feature at revision 1
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        environment_id: impl Into<String>,
        environment_name: impl Into<String>,
        project_id: impl Into<String>,
        project_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            enabled: false,
            json_value: None,
            revision: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            environment_id: environment_id.into(),
            environment_name: environment_name.into(),
            project_id: project_id.into(),
            project_name: project_name.into(),
        }
    }

    /// Check if the feature has been soft-deleted
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A project groups environments and the features they share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A deployment environment; its id doubles as the SDK key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: String,
    pub name: String,
    pub project_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEnvironmentRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFeatureRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Changes to one feature in one environment
///
/// Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFeatureRequest {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub json_value: Option<JsonValue>,
    #[serde(default)]
    pub description: Option<String>,
}
