//! Change events routed through the registry
//!
//! This module defines the routing key for subscriptions and the immutable
//! events that are fanned out to them.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::features::Feature;

/// Identifier of the environment a subscription is scoped to
///
/// This is the only routing key used by the broadcaster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentId(String);

impl EnvironmentId {
    /// Create a new environment id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EnvironmentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EnvironmentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Kind of change event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A feature was created in the environment
    FeatureCreated,
    /// A feature's state changed
    FeatureUpdated,
    /// A feature was deleted
    FeatureDeleted,
    /// Full feature set of the environment
    Snapshot,
}

impl EventKind {
    /// Wire name of the event kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FeatureCreated => "feature_created",
            EventKind::FeatureUpdated => "feature_updated",
            EventKind::FeatureDeleted => "feature_deleted",
            EventKind::Snapshot => "snapshot",
        }
    }

    /// Parse a wire name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "feature_created" => Some(EventKind::FeatureCreated),
            "feature_updated" => Some(EventKind::FeatureUpdated),
            "feature_deleted" => Some(EventKind::FeatureDeleted),
            "snapshot" => Some(EventKind::Snapshot),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable change notification
///
/// Published events are wrapped in an `Arc` once and shared by every matching
/// subscription. The payload is `Bytes`, so cloning a frame out of it never
/// copies the serialized feature.
#[derive(Debug, Clone)]
pub struct Event {
    /// Position in the broadcaster's global order (0 until published)
    pub sequence: u64,
    /// What happened
    pub kind: EventKind,
    /// Routing key
    pub environment_id: EnvironmentId,
    /// Serialized feature, or serialized feature list for snapshots
    pub payload: Bytes,
}

impl Event {
    /// Create an event from an already serialized payload
    pub fn new(kind: EventKind, environment_id: EnvironmentId, payload: Bytes) -> Self {
        Self {
            sequence: 0,
            kind,
            environment_id,
            payload,
        }
    }

    /// Create a feature change event for the feature's own environment
    pub fn feature(kind: EventKind, feature: &Feature) -> serde_json::Result<Self> {
        let payload = Bytes::from(serde_json::to_vec(feature)?);
        Ok(Self::new(
            kind,
            EnvironmentId::new(feature.environment_id.clone()),
            payload,
        ))
    }

    /// Create a `feature_created` event
    pub fn feature_created(feature: &Feature) -> serde_json::Result<Self> {
        Self::feature(EventKind::FeatureCreated, feature)
    }

    /// Create a `feature_updated` event
    pub fn feature_updated(feature: &Feature) -> serde_json::Result<Self> {
        Self::feature(EventKind::FeatureUpdated, feature)
    }

    /// Create a `feature_deleted` event
    pub fn feature_deleted(feature: &Feature) -> serde_json::Result<Self> {
        Self::feature(EventKind::FeatureDeleted, feature)
    }

    /// Create a snapshot event carrying the whole feature set
    pub fn snapshot(
        environment_id: EnvironmentId,
        features: &[Feature],
        sequence: u64,
    ) -> serde_json::Result<Self> {
        let payload = Bytes::from(serde_json::to_vec(features)?);
        Ok(Self {
            sequence,
            kind: EventKind::Snapshot,
            environment_id,
            payload,
        })
    }

    /// Check if this is a snapshot event
    pub fn is_snapshot(&self) -> bool {
        self.kind == EventKind::Snapshot
    }

    /// Build the framed text message written to a transport
    pub fn to_frame(&self) -> Frame {
        Frame {
            id: self.sequence,
            event: self.kind.as_str(),
            data: self.payload.clone(),
        }
    }
}

/// One framed text message for a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Event sequence number
    pub id: u64,
    /// Event kind wire name
    pub event: &'static str,
    /// JSON payload
    pub data: Bytes,
}

impl Frame {
    /// Payload as text
    pub fn data_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    /// Parsed event kind
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::parse(self.event)
    }
}
