//! Feature flags and the store they live in
//!
//! The live-update pipeline only depends on the [`FeatureStore`] read trait.
//! [`MemoryFeatureStore`] is the in-process implementation and
//! [`FeatureService`] is the mutation layer that publishes after commit.

pub mod error;
pub mod memory;
pub mod model;
pub mod service;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryFeatureStore;
pub use model::{
    CreateEnvironmentRequest, CreateFeatureRequest, CreateProjectRequest, Environment, Feature,
    JsonValue, Project, UpdateFeatureRequest,
};
pub use service::FeatureService;
pub use store::FeatureStore;
