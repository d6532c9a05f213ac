//! Cached layout entries and their enrichment metadata.

use serde::{Deserialize, Serialize};

use crate::geometry::{CornerMarker, GeometrySignature, SignatureError, TrackPoint};
use crate::round::RoundRef;

/// Race winner for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinnerRecord {
    pub year: i32,
    pub round: u32,
    pub driver: String,
    #[serde(default)]
    pub team: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl WinnerRecord {
    pub fn round_ref(&self) -> RoundRef {
        RoundRef::new(self.year, self.round)
    }
}

/// A cluster of rounds sharing identical track geometry.
///
/// Label and length come from the most recent member round; `years` is the
/// sorted distinct set of member years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutVariant {
    pub signature: GeometrySignature,
    pub layout_label: String,
    pub layout_length: f64,
    pub years: Vec<i32>,
    pub rounds: Vec<RoundRef>,
}

/// One cached layout instance: the geometry loaded in Phase 1 plus the
/// track-level metadata attached in Phase 2.
///
/// Every enrichment field defaults to empty when absent in stored JSON, so a
/// geometry-only entry (or one written by an older pipeline) still
/// deserializes and is served as partial data, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundEntry {
    pub round: RoundRef,
    pub layout_label: String,
    pub layout_length: f64,
    #[serde(default)]
    pub points: Vec<TrackPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corners: Vec<CornerMarker>,
    pub signature: GeometrySignature,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub winners: Vec<WinnerRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<WinnerRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layout_variants: Vec<LayoutVariant>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layout_years: Vec<i32>,
}

impl RoundEntry {
    /// Build a geometry-only entry, computing its signature. Phase 2 fills
    /// the metadata fields later.
    pub fn from_geometry(
        round: RoundRef,
        layout_label: impl Into<String>,
        layout_length: f64,
        points: Vec<TrackPoint>,
        corners: Vec<CornerMarker>,
    ) -> Result<Self, SignatureError> {
        let signature = GeometrySignature::compute(&points)?;
        Ok(Self {
            round,
            layout_label: layout_label.into(),
            layout_length,
            points,
            corners,
            signature,
            winners: Vec::new(),
            winner: None,
            layout_variants: Vec::new(),
            layout_years: Vec::new(),
        })
    }

    /// Whether this entry carries usable point geometry.
    pub fn has_geometry(&self) -> bool {
        !self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(year: i32, round: u32) -> RoundEntry {
        RoundEntry::from_geometry(
            RoundRef::new(year, round),
            "Grand Prix Circuit",
            5.793,
            vec![TrackPoint::new(0.0, 0.0), TrackPoint::new(1.0, 2.0)],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn test_from_geometry_signs_points() {
        let e = entry(2021, 8);
        let expected = GeometrySignature::compute(&e.points).unwrap();
        assert_eq!(e.signature, expected);
        assert!(e.has_geometry());
        assert!(e.winners.is_empty());
        assert!(e.winner.is_none());
    }

    #[test]
    fn test_metadata_defaults_when_absent() {
        // A geometry-only payload from an older pipeline: no winners, no
        // variants, no layout_years.
        let json = r#"{
            "round": {"year": 2019, "round": 6},
            "layout_label": "Grand Prix Circuit",
            "layout_length": 5.793,
            "points": [{"x": 0.0, "y": 0.0}],
            "signature": "abc123"
        }"#;
        let parsed: RoundEntry = serde_json::from_str(json).unwrap();
        assert!(parsed.winners.is_empty());
        assert!(parsed.winner.is_none());
        assert!(parsed.layout_variants.is_empty());
        assert!(parsed.layout_years.is_empty());
        assert!(parsed.has_geometry());
    }

    #[test]
    fn test_missing_points_tolerated() {
        let json = r#"{
            "round": {"year": 2019, "round": 6},
            "layout_label": "Grand Prix Circuit",
            "layout_length": 5.793,
            "signature": "abc123"
        }"#;
        let parsed: RoundEntry = serde_json::from_str(json).unwrap();
        assert!(!parsed.has_geometry());
    }

    #[test]
    fn test_winner_round_trip() {
        let w = WinnerRecord {
            year: 2021,
            round: 8,
            driver: "Max Verstappen".to_string(),
            team: "Red Bull Racing".to_string(),
            code: Some("VER".to_string()),
        };
        let json = serde_json::to_string(&w).unwrap();
        let parsed: WinnerRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, w);
        assert_eq!(parsed.round_ref(), RoundRef::new(2021, 8));
    }

    #[test]
    fn test_winner_team_defaults_empty() {
        let json = r#"{"year": 2021, "round": 8, "driver": "Max Verstappen"}"#;
        let parsed: WinnerRecord = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.team, "");
        assert_eq!(parsed.code, None);
    }
}
