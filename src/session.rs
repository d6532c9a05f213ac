//! Ephemeral session cache and the schema-version guard.
//!
//! The session cache is a small file-per-entry store under the session
//! directory. Entry names carry a version-tagged prefix plus the track key
//! and round (`layout.v{N}.{track}.{year}-{round}.json`), so entries written
//! by different schema versions can never collide.
//!
//! On open, the guard compares a marker file against the expected schema
//! version. On mismatch it purges every entry, not just changed ones:
//! metadata shape changes make partially-cached old entries structurally
//! incompatible, and a full purge is safer than migrating in place. The
//! purge is invisible to callers.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use apexmap_model::{RoundEntry, RoundRef, TrackKey, SCHEMA_VERSION};

/// Marker file holding the last-seen schema version.
const VERSION_MARKER: &str = ".schema_version";

/// Prefix shared by every session entry file, across all versions.
const ENTRY_PREFIX: &str = "layout.";

/// Errors from session cache operations. Lookups degrade to `None` instead.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to serialize session entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Structurally typed session key. The versioned file name is rendered in
/// exactly one place, never hand-built at call sites.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub track: TrackKey,
    pub round: RoundRef,
}

impl SessionKey {
    pub fn new(track: TrackKey, round: RoundRef) -> Self {
        Self { track, round }
    }

    /// Entry file name under the session directory.
    pub fn file_name(&self) -> String {
        format!(
            "{}v{}.{}.{}.json",
            ENTRY_PREFIX,
            SCHEMA_VERSION,
            self.track,
            self.round.entry_key()
        )
    }
}

/// On-disk payload of one session entry. The version field is redundant with
/// the file name prefix but makes the stored payload self-describing.
#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    schema_version: u32,
    entry: RoundEntry,
}

/// File-backed ephemeral cache, one JSON file per resolved entry.
#[derive(Debug)]
pub struct SessionCache {
    root: PathBuf,
}

impl SessionCache {
    /// Open the session cache, creating the directory and running the
    /// version guard.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let cache = Self { root: root.into() };
        fs::create_dir_all(&cache.root)?;
        cache.run_version_guard()?;
        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_version_guard(&self) -> Result<(), SessionError> {
        let marker = self.root.join(VERSION_MARKER);
        let last_seen: Option<u32> = fs::read_to_string(&marker)
            .ok()
            .and_then(|s| s.trim().parse().ok());

        if last_seen != Some(SCHEMA_VERSION) {
            let purged = self.purge_all()?;
            if last_seen.is_some() || purged > 0 {
                info!(
                    last_seen = ?last_seen,
                    expected = SCHEMA_VERSION,
                    purged,
                    "schema version changed, purged session cache"
                );
            }
            fs::write(&marker, SCHEMA_VERSION.to_string())?;
        }
        Ok(())
    }

    /// Exact lookup. A corrupt or mismatched entry file reads as a miss.
    pub fn get(&self, key: &SessionKey) -> Option<RoundEntry> {
        let path = self.root.join(key.file_name());
        let raw = fs::read_to_string(&path).ok()?;

        match serde_json::from_str::<SessionRecord>(&raw) {
            Ok(record) if record.schema_version == SCHEMA_VERSION => Some(record.entry),
            Ok(record) => {
                warn!(
                    key = %path.display(),
                    found = record.schema_version,
                    "session entry carries unexpected schema version, ignoring"
                );
                None
            }
            Err(e) => {
                warn!(key = %path.display(), error = %e, "session entry corrupt, dropping");
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    /// Store an entry under the key. Concurrent writers for the same key are
    /// last-writer-wins; payloads for identical inputs are identical, so the
    /// race is harmless.
    pub fn put(&self, key: &SessionKey, entry: &RoundEntry) -> Result<(), SessionError> {
        let record = SessionRecord {
            schema_version: SCHEMA_VERSION,
            entry: entry.clone(),
        };
        let json = serde_json::to_string(&record)?;
        fs::write(self.root.join(key.file_name()), json)?;
        Ok(())
    }

    /// Remove every session entry, of any version. Returns the number of
    /// entries removed.
    pub fn purge_all(&self) -> Result<usize, SessionError> {
        let mut purged = 0;
        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(ENTRY_PREFIX) && fs::remove_file(dir_entry.path()).is_ok() {
                purged += 1;
            }
        }
        Ok(purged)
    }

    /// Number of live entry files (any version).
    pub fn entry_count(&self) -> usize {
        let Ok(read) = fs::read_dir(&self.root) else { return 0 };
        read.filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .map(|n| n.starts_with(ENTRY_PREFIX))
                    .unwrap_or(false)
            })
            .count()
    }
}
