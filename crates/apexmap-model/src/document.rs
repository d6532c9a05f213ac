//! The persisted per-track snapshot document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entry::RoundEntry;
use crate::key::TrackKey;
use crate::round::RoundRef;
use crate::SCHEMA_VERSION;

/// Bundle file name for a track: `trackmap_{key}.json`.
///
/// The same scheme names files on the producer side and locates them on the
/// consumer side; it must never be rebuilt by hand elsewhere.
pub fn snapshot_file_name(key: &TrackKey) -> String {
    format!("trackmap_{}.json", key)
}

/// The persisted unit per track: a schema version, the track key, and the
/// round entries keyed by their canonical `"{year}-{round}"` form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub schema_version: u32,
    pub track_key: TrackKey,
    #[serde(default)]
    pub entries: BTreeMap<String, RoundEntry>,
}

impl SnapshotDocument {
    /// Create an empty document at the current schema version.
    pub fn new(track_key: TrackKey) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            track_key,
            entries: BTreeMap::new(),
        }
    }

    /// Whether the document was written at the currently expected version.
    pub fn is_current_version(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }

    /// Look up the entry for an exact round.
    pub fn entry_for(&self, round: RoundRef) -> Option<&RoundEntry> {
        self.entries.get(&round.entry_key())
    }

    /// Whether an entry exists for the round (with or without geometry).
    pub fn contains_round(&self, round: RoundRef) -> bool {
        self.entries.contains_key(&round.entry_key())
    }

    /// Insert an entry under its canonical round key, replacing any
    /// previous entry for that round.
    pub fn insert(&mut self, entry: RoundEntry) {
        self.entries.insert(entry.round.entry_key(), entry);
    }

    /// The entry with the greatest `RoundRef` that still carries point
    /// geometry. This is the fallback-to-latest candidate when an exact
    /// round is absent from the document.
    pub fn latest_with_geometry(&self) -> Option<&RoundEntry> {
        self.entries
            .values()
            .filter(|e| e.has_geometry())
            .max_by_key(|e| e.round)
    }

    pub fn round_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::TrackPoint;

    fn entry(year: i32, round: u32, with_geometry: bool) -> RoundEntry {
        let points = if with_geometry {
            vec![TrackPoint::new(0.0, 0.0), TrackPoint::new(1.0, 1.0)]
        } else {
            vec![]
        };
        RoundEntry::from_geometry(RoundRef::new(year, round), "GP Circuit", 5.0, points, vec![])
            .unwrap()
    }

    #[test]
    fn test_file_name_scheme() {
        let key = TrackKey::derive("São Paulo");
        assert_eq!(snapshot_file_name(&key), "trackmap_sao_paulo.json");
    }

    #[test]
    fn test_insert_and_exact_lookup() {
        let mut doc = SnapshotDocument::new(TrackKey::derive("Monaco"));
        doc.insert(entry(2019, 6, true));
        doc.insert(entry(2021, 8, true));

        assert_eq!(doc.round_count(), 2);
        assert!(doc.contains_round(RoundRef::new(2019, 6)));
        assert!(doc.entry_for(RoundRef::new(2020, 8)).is_none());
        let found = doc.entry_for(RoundRef::new(2021, 8)).unwrap();
        assert_eq!(found.round, RoundRef::new(2021, 8));
    }

    #[test]
    fn test_latest_with_geometry_picks_greatest_round() {
        let mut doc = SnapshotDocument::new(TrackKey::derive("Monaco"));
        doc.insert(entry(2019, 6, true));
        doc.insert(entry(2021, 8, true));
        doc.insert(entry(2021, 3, true));

        let latest = doc.latest_with_geometry().unwrap();
        assert_eq!(latest.round, RoundRef::new(2021, 8));
    }

    #[test]
    fn test_latest_with_geometry_skips_empty_entries() {
        let mut doc = SnapshotDocument::new(TrackKey::derive("Monaco"));
        doc.insert(entry(2019, 6, true));
        doc.insert(entry(2022, 7, false));

        let latest = doc.latest_with_geometry().unwrap();
        assert_eq!(latest.round, RoundRef::new(2019, 6));
    }

    #[test]
    fn test_latest_with_geometry_none_when_all_empty() {
        let mut doc = SnapshotDocument::new(TrackKey::derive("Monaco"));
        doc.insert(entry(2022, 7, false));
        assert!(doc.latest_with_geometry().is_none());
    }

    #[test]
    fn test_version_check() {
        let doc = SnapshotDocument::new(TrackKey::derive("Monaco"));
        assert!(doc.is_current_version());

        let stale = SnapshotDocument {
            schema_version: SCHEMA_VERSION - 1,
            ..doc
        };
        assert!(!stale.is_current_version());
    }

    #[test]
    fn test_serde_round_trip_keyed_by_round() {
        let mut doc = SnapshotDocument::new(TrackKey::derive("Monaco"));
        doc.insert(entry(2021, 8, true));

        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"2021-8\""));
        let parsed: SnapshotDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_entries_default_when_absent() {
        let json = r#"{"schema_version": 2, "track_key": "monaco"}"#;
        let parsed: SnapshotDocument = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.round_count(), 0);
    }
}
