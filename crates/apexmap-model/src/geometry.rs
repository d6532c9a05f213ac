//! Track geometry and its deterministic fingerprint.
//!
//! Two rounds share a layout when their point clouds agree after
//! quantization. The signature is the SHA-256 hex digest of the quantized
//! coordinate sequence serialized with RFC 8785 JCS, so producers and
//! consumers compute identical fingerprints regardless of float formatting.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Quantization scale applied to coordinates before hashing.
///
/// Coordinates are multiplied by this scale and rounded to integers, i.e.
/// one tenth of a layout unit. Coarse enough that float noise between
/// sessions of the same layout collapses to one signature; fine enough that
/// real layout changes (a removed chicane moves points by whole units) do
/// not. Fixed by contract: changing it silently reshapes every historical
/// cluster.
pub const QUANT_SCALE: f64 = 10.0;

/// One point of the track outline, in layout-local units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub x: f64,
    pub y: f64,
}

impl TrackPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A corner marker: where the corner sits on the track and where its label
/// is drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerMarker {
    pub number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub letter: Option<String>,
    pub track: TrackPoint,
    pub label: TrackPoint,
}

/// Errors from signature computation.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("failed to canonicalize geometry payload: {0}")]
    Canonicalize(String),
}

/// Deterministic fingerprint of a quantized point cloud.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeometrySignature(String);

impl GeometrySignature {
    /// Compute the signature of a point cloud.
    ///
    /// Signature = SHA-256 hex digest of JCS(quantized coordinate pairs).
    pub fn compute(points: &[TrackPoint]) -> Result<GeometrySignature, SignatureError> {
        let quantized: Vec<[i64; 2]> = points
            .iter()
            .map(|p| [quantize(p.x), quantize(p.y)])
            .collect();

        let jcs_bytes = serde_json_canonicalizer::to_vec(&quantized)
            .map_err(|e| SignatureError::Canonicalize(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(&jcs_bytes);
        Ok(GeometrySignature(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn quantize(v: f64) -> i64 {
    (v * QUANT_SCALE).round() as i64
}
