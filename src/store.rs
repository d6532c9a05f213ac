//! On-disk snapshot store.
//!
//! One JSON document per track, named `trackmap_{key}.json` under the bundle
//! directory. The warmup pipeline is the only writer; at request time the
//! bundle is read-only. Writes go to a temp file in the same directory and
//! are renamed into place, so readers never observe a half-written document.
//!
//! The read path never fails the caller: a missing, unreadable, corrupt, or
//! stale-versioned document behaves as absent (with a warning), and the next
//! tier gets its chance.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use apexmap_model::{snapshot_file_name, SnapshotDocument, TrackKey};

/// Errors from snapshot store writes. Reads degrade to `None` instead.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to serialize snapshot document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Per-track status for the cache status query.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TrackStatus {
    pub exists: bool,
    pub rounds: usize,
}

/// Snapshot document store rooted at the bundle directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    /// Create a store handle. The directory is created lazily on first save;
    /// the read side works against a missing directory (everything absent).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the document for a track.
    pub fn document_path(&self, key: &TrackKey) -> PathBuf {
        self.root.join(snapshot_file_name(key))
    }

    /// Load the document for a track, or `None` when no usable document
    /// exists. The empty key sentinel never matches a document.
    pub fn load(&self, key: &TrackKey) -> Option<SnapshotDocument> {
        if key.is_empty() {
            return None;
        }
        let path = self.document_path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(track = %key, error = %e, "snapshot document unreadable, treating as absent");
                return None;
            }
        };

        let doc: SnapshotDocument = match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(track = %key, error = %e, "snapshot document corrupt, treating as absent");
                return None;
            }
        };

        if !doc.is_current_version() {
            warn!(
                track = %key,
                found = doc.schema_version,
                expected = apexmap_model::SCHEMA_VERSION,
                "snapshot document has stale schema version, treating as absent"
            );
            return None;
        }

        Some(doc)
    }

    /// Persist a document atomically: write `<file>.tmp`, then rename over
    /// the final name.
    pub fn save(&self, doc: &SnapshotDocument) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;

        let path = self.document_path(&doc.track_key);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string(doc)?;
        fs::write(&tmp, json)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::Io(e));
        }
        Ok(())
    }

    /// Whether a document file exists for the track (without validating it).
    pub fn exists(&self, key: &TrackKey) -> bool {
        !key.is_empty() && self.document_path(key).exists()
    }

    /// Status for the cache status query: file presence plus the round count
    /// of the loadable document (0 when absent or unusable).
    pub fn status(&self, key: &TrackKey) -> TrackStatus {
        let exists = self.exists(key);
        let rounds = self.load(key).map(|d| d.round_count()).unwrap_or(0);
        TrackStatus { exists, rounds }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apexmap_model::{RoundEntry, RoundRef, TrackPoint, SCHEMA_VERSION};
    use tempfile::TempDir;

    fn sample_doc(name: &str) -> SnapshotDocument {
        let mut doc = SnapshotDocument::new(TrackKey::derive(name));
        let entry = RoundEntry::from_geometry(
            RoundRef::new(2021, 8),
            "GP Circuit",
            5.0,
            vec![TrackPoint::new(0.0, 0.0), TrackPoint::new(1.0, 1.0)],
            vec![],
        )
        .unwrap();
        doc.insert(entry);
        doc
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());

        let doc = sample_doc("Monaco");
        store.save(&doc).unwrap();

        assert!(dir.path().join("trackmap_monaco.json").exists());
        let loaded = store.load(&TrackKey::derive("Monaco")).unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(store.load(&TrackKey::derive("Monaco")).is_none());
    }

    #[test]
    fn test_load_empty_key_is_none() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(store.load(&TrackKey::empty()).is_none());
        assert!(!store.exists(&TrackKey::empty()));
    }

    #[test]
    fn test_load_corrupt_is_none() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        fs::write(dir.path().join("trackmap_monaco.json"), "{not json").unwrap();
        assert!(store.load(&TrackKey::derive("Monaco")).is_none());
    }

    #[test]
    fn test_load_stale_version_is_none() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());

        let mut doc = sample_doc("Monaco");
        doc.schema_version = SCHEMA_VERSION - 1;
        let json = serde_json::to_string(&doc).unwrap();
        fs::write(dir.path().join("trackmap_monaco.json"), json).unwrap();

        assert!(store.load(&TrackKey::derive("Monaco")).is_none());
        // The file is still there; only the read path refuses it.
        assert!(store.exists(&TrackKey::derive("Monaco")));
    }

    #[test]
    fn test_save_overwrites_atomically() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());

        let mut doc = sample_doc("Monaco");
        store.save(&doc).unwrap();

        let entry = RoundEntry::from_geometry(
            RoundRef::new(2022, 7),
            "GP Circuit",
            5.0,
            vec![TrackPoint::new(2.0, 2.0), TrackPoint::new(3.0, 3.0)],
            vec![],
        )
        .unwrap();
        doc.insert(entry);
        store.save(&doc).unwrap();

        let loaded = store.load(&TrackKey::derive("Monaco")).unwrap();
        assert_eq!(loaded.round_count(), 2);
        // No temp residue once the rename has landed.
        assert!(!dir.path().join("trackmap_monaco.json.tmp").exists());
    }

    #[test]
    fn test_status_counts_rounds() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());

        let missing = store.status(&TrackKey::derive("Monza"));
        assert_eq!(missing, TrackStatus { exists: false, rounds: 0 });

        store.save(&sample_doc("Monza")).unwrap();
        let present = store.status(&TrackKey::derive("Monza"));
        assert_eq!(present, TrackStatus { exists: true, rounds: 1 });
    }
}
