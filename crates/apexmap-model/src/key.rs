//! Canonical track-key derivation.
//!
//! A `TrackKey` names one circuit across every tier: the snapshot bundle file
//! on disk, the session cache entry, and the origin request all use the same
//! derived key. The derivation must therefore be byte-stable: NFKD
//! decomposition, diacritics stripped, non-alphanumeric runs collapsed to a
//! single underscore, no leading or trailing underscores, lowercase.

use std::fmt;

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonical identifier for a circuit, derived from its display name.
///
/// The derived form only ever contains `[a-z0-9_]`, which makes it safe to
/// embed in file names without further escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackKey(String);

impl TrackKey {
    /// Derive the canonical key from a display name.
    ///
    /// Input that normalizes to nothing (empty, whitespace, punctuation-only)
    /// yields the empty sentinel; callers must treat that as "no canonical
    /// key available" and skip bundle lookup. Idempotent:
    /// `derive(derive(x)) == derive(x)`.
    pub fn derive(raw: &str) -> TrackKey {
        let mut key = String::with_capacity(raw.len());
        let mut pending_sep = false;

        for c in raw.nfkd() {
            if is_combining_mark(c) {
                continue;
            }
            if c.is_ascii_alphanumeric() {
                if pending_sep && !key.is_empty() {
                    key.push('_');
                }
                pending_sep = false;
                key.push(c.to_ascii_lowercase());
            } else {
                // Runs of separators collapse; leading runs are dropped
                // because nothing has been emitted yet.
                pending_sep = true;
            }
        }

        TrackKey(key)
    }

    /// The empty-key sentinel returned for underivable input.
    pub fn empty() -> TrackKey {
        TrackKey(String::new())
    }

    /// Whether this is the empty sentinel.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
