//! Track inventory: which circuits exist and which rounds they hosted.
//!
//! The warmup batch and the status query both walk this inventory. It is a
//! JSON file (`tracks.json`) listing display names and historical events;
//! canonical keys are derived here, once, with the shared deriver.

use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use apexmap_model::{RoundRef, TrackKey};

/// Errors from inventory loading.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid inventory file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    tracks: Vec<RawTrack>,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    name: String,
    #[serde(default)]
    events: Vec<RoundRef>,
}

/// One known circuit with its derived key and event history.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSchedule {
    pub key: TrackKey,
    pub name: String,
    /// Sorted ascending, distinct.
    pub events: Vec<RoundRef>,
}

/// The full set of known tracks.
#[derive(Debug, Clone, Default)]
pub struct TrackInventory {
    pub tracks: Vec<TrackSchedule>,
}

impl TrackInventory {
    /// Load the inventory file. Tracks whose name derives to the empty key
    /// are dropped with a warning: without a canonical key they can never be
    /// stored or resolved.
    pub fn load(path: &Path) -> Result<TrackInventory, InventoryError> {
        let raw = fs::read_to_string(path).map_err(|source| InventoryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: InventoryFile = serde_json::from_str(&raw).map_err(|source| InventoryError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        let mut tracks = Vec::with_capacity(file.tracks.len());
        for track in file.tracks {
            let key = TrackKey::derive(&track.name);
            if key.is_empty() {
                warn!(name = %track.name, "track name derives to empty key, skipping");
                continue;
            }
            let mut events = track.events;
            events.sort_unstable();
            events.dedup();
            tracks.push(TrackSchedule { key, name: track.name, events });
        }

        Ok(TrackInventory { tracks })
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }
}
