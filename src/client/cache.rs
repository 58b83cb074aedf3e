//! Local flag cache
//!
//! Applies a stream of frames to a local copy of one environment's feature
//! set. Live events are applied by id and revision, so a change that is
//! already reflected in the snapshot (or delivered twice) is harmless.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::features::Feature;
use crate::registry::{EventKind, Frame};

/// What applying one frame did to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The whole set was replaced; holds the new feature count
    Snapshot(usize),
    /// A feature was inserted or replaced
    Upserted,
    /// A feature was removed
    Removed,
    /// The frame carried nothing newer than what is held
    Stale,
}

/// Converged view of one environment's features
#[derive(Debug, Default)]
pub struct FlagCache {
    features: HashMap<String, Feature>,
    /// Revision of every deleted id, so a stale create cannot resurrect it
    tombstones: HashMap<String, u64>,
    last_sequence: u64,
}

impl FlagCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one frame
    pub fn apply(&mut self, frame: &Frame) -> Result<Applied> {
        let kind = frame
            .kind()
            .ok_or_else(|| Error::InvalidFrame(format!("unknown event {:?}", frame.event)))?;

        let applied = match kind {
            EventKind::Snapshot => {
                let features: Vec<Feature> = serde_json::from_slice(&frame.data)?;
                self.replace_all(features)
            }
            EventKind::FeatureCreated | EventKind::FeatureUpdated => {
                let feature: Feature = serde_json::from_slice(&frame.data)?;
                self.upsert(feature)
            }
            EventKind::FeatureDeleted => {
                let feature: Feature = serde_json::from_slice(&frame.data)?;
                self.remove(feature)
            }
        };

        self.last_sequence = self.last_sequence.max(frame.id);
        Ok(applied)
    }

    fn replace_all(&mut self, features: Vec<Feature>) -> Applied {
        self.features = features
            .into_iter()
            .filter(|f| !f.is_deleted())
            .map(|f| (f.id.clone(), f))
            .collect();
        let features = &self.features;
        self.tombstones.retain(|id, _| !features.contains_key(id));
        Applied::Snapshot(self.features.len())
    }

    fn held_revision(&self, id: &str) -> Option<u64> {
        let live = self.features.get(id).map(|f| f.revision);
        let dead = self.tombstones.get(id).copied();
        live.max(dead)
    }

    fn upsert(&mut self, feature: Feature) -> Applied {
        if self.held_revision(&feature.id) >= Some(feature.revision) {
            return Applied::Stale;
        }
        self.tombstones.remove(&feature.id);
        self.features.insert(feature.id.clone(), feature);
        Applied::Upserted
    }

    fn remove(&mut self, feature: Feature) -> Applied {
        if self.held_revision(&feature.id) >= Some(feature.revision) {
            return Applied::Stale;
        }
        self.features.remove(&feature.id);
        self.tombstones.insert(feature.id, feature.revision);
        Applied::Removed
    }

    pub fn get(&self, id: &str) -> Option<&Feature> {
        self.features.get(id)
    }

    /// Check if a feature is present and enabled
    pub fn is_enabled(&self, id: &str) -> bool {
        self.features.get(id).is_some_and(|f| f.enabled)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// All held features, ordered by name then id
    pub fn features(&self) -> Vec<&Feature> {
        let mut features: Vec<_> = self.features.values().collect();
        features.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        features
    }

    /// Highest frame id applied so far
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::registry::Event;

    fn feature(id: &str, revision: u64, enabled: bool) -> Feature {
        let mut feature = Feature::new(id, id, "env-1", "production", "p1", "shop");
        feature.revision = revision;
        feature.enabled = enabled;
        feature
    }

    fn frame(kind: EventKind, feature: &Feature, sequence: u64) -> Frame {
        let mut event = Event::feature(kind, feature).unwrap();
        event.sequence = sequence;
        event.to_frame()
    }

    fn snapshot(features: &[Feature]) -> Frame {
        Event::snapshot("env-1".into(), features, 0).unwrap().to_frame()
    }

    #[test]
    fn test_snapshot_replaces_everything() {
        let mut cache = FlagCache::new();
        cache
            .apply(&frame(EventKind::FeatureCreated, &feature("old", 1, true), 1))
            .unwrap();

        let applied = cache
            .apply(&snapshot(&[feature("a", 1, false), feature("b", 2, true)]))
            .unwrap();

        assert_eq!(applied, Applied::Snapshot(2));
        assert!(cache.get("old").is_none());
        assert!(cache.is_enabled("b"));
        let names: Vec<_> = cache.features().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_duplicate_event_is_stale() {
        let mut cache = FlagCache::new();
        let f1 = feature("f1", 1, false);
        cache.apply(&snapshot(std::slice::from_ref(&f1))).unwrap();

        // Already contained in the snapshot
        let applied = cache.apply(&frame(EventKind::FeatureCreated, &f1, 5)).unwrap();
        assert_eq!(applied, Applied::Stale);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.last_sequence(), 5);
    }

    #[test]
    fn test_newer_revision_wins() {
        let mut cache = FlagCache::new();
        cache.apply(&snapshot(&[feature("f1", 1, false)])).unwrap();

        let applied = cache
            .apply(&frame(EventKind::FeatureUpdated, &feature("f1", 2, true), 2))
            .unwrap();
        assert_eq!(applied, Applied::Upserted);
        assert!(cache.is_enabled("f1"));

        // An older update arriving late changes nothing
        cache
            .apply(&frame(EventKind::FeatureUpdated, &feature("f1", 1, false), 3))
            .unwrap();
        assert!(cache.is_enabled("f1"));
    }

    #[test]
    fn test_delete_leaves_tombstone() {
        let mut cache = FlagCache::new();
        cache.apply(&snapshot(&[feature("f1", 1, true)])).unwrap();

        let mut tombstone = feature("f1", 2, true);
        tombstone.deleted_at = Some(Utc::now());
        let applied = cache
            .apply(&frame(EventKind::FeatureDeleted, &tombstone, 2))
            .unwrap();
        assert_eq!(applied, Applied::Removed);
        assert!(cache.is_empty());

        // A duplicate create of the original revision cannot resurrect it
        let applied = cache
            .apply(&frame(EventKind::FeatureCreated, &feature("f1", 1, true), 3))
            .unwrap();
        assert_eq!(applied, Applied::Stale);
        assert!(cache.get("f1").is_none());
    }

    #[test]
    fn test_unknown_event_rejected() {
        let mut cache = FlagCache::new();
        let frame = Frame {
            id: 1,
            event: "feature_renamed",
            data: "{}".into(),
        };
        assert!(matches!(cache.apply(&frame), Err(Error::InvalidFrame(_))));
    }

    #[test]
    fn test_bad_payload_rejected() {
        let mut cache = FlagCache::new();
        let frame = Frame {
            id: 1,
            event: "feature_updated",
            data: "not json".into(),
        };
        assert!(matches!(cache.apply(&frame), Err(Error::Serialization(_))));
    }
}
