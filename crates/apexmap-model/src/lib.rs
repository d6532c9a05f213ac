//! Shared schema types for apexmap snapshot documents.
//!
//! Defines the canonical track-key derivation, geometry fingerprinting, and
//! the versioned document schema. Both the warmup pipeline (producer) and the
//! tiered resolver (consumer) take their key naming from this crate, so the
//! two sides can never drift apart.

pub mod document;
pub mod entry;
pub mod geometry;
pub mod key;
pub mod round;

pub use document::{snapshot_file_name, SnapshotDocument};
pub use entry::{LayoutVariant, RoundEntry, WinnerRecord};
pub use geometry::{CornerMarker, GeometrySignature, SignatureError, TrackPoint, QUANT_SCALE};
pub use key::TrackKey;
pub use round::{RoundParseError, RoundRef};

/// Schema version carried by every persisted snapshot document and session
/// cache entry.
///
/// Bump this when the entry shape changes incompatibly. Documents with a
/// different version read as absent, and the session guard purges all
/// ephemeral entries on mismatch.
pub const SCHEMA_VERSION: u32 = 2;
