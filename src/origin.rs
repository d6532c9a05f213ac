//! Origin provider and results source seams.
//!
//! The live geometry integration is an external collaborator: something that
//! can answer "raw layout for this track and round" or fail. Everything
//! behind these traits is opaque to the resolver and the warmup pipeline,
//! which only see `Ok(Some)`, `Ok(None)`, or an error to degrade on.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use apexmap_model::{CornerMarker, RoundRef, TrackKey, TrackPoint, WinnerRecord};

/// Errors from origin and results-source calls.
#[derive(Debug, Error)]
pub enum OriginError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("origin returned an unusable payload: {0}")]
    Payload(String),
}

/// Raw layout data as returned by an origin, before signing and caching.
///
/// The `round` is the round the origin actually answered for, which may
/// differ from the requested one (rescheduled or renumbered events).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLayout {
    pub round: RoundRef,
    pub layout_label: String,
    pub layout_length: f64,
    pub points: Vec<TrackPoint>,
    #[serde(default)]
    pub corners: Vec<CornerMarker>,
}

/// Live (or fixture) source of raw track geometry.
pub trait OriginProvider: Send + Sync {
    /// Fetch the raw layout for a track and round. `Ok(None)` means the
    /// origin has no data for this event; errors are for transport or
    /// payload faults.
    fn fetch_layout(&self, track: &TrackKey, round: RoundRef) -> Result<Option<RawLayout>, OriginError>;
}

/// Source of race results, separate from the geometry origin.
pub trait ResultsSource {
    /// The winner of one event, if known.
    fn race_winner(&self, round: RoundRef) -> Result<Option<WinnerRecord>, OriginError>;
}

/// Directory-backed origin reading `layout_{track}_{year}-{round}.json`
/// files. Serves offline batches and tests; the production origin lives
/// behind the same trait elsewhere.
#[derive(Debug, Clone)]
pub struct FixtureOrigin {
    root: PathBuf,
}

impl FixtureOrigin {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Fixture file name for a track and round.
    pub fn layout_file_name(track: &TrackKey, round: RoundRef) -> String {
        format!("layout_{}_{}.json", track, round.entry_key())
    }

    fn layout_path(&self, track: &TrackKey, round: RoundRef) -> PathBuf {
        self.root.join(Self::layout_file_name(track, round))
    }
}

impl OriginProvider for FixtureOrigin {
    fn fetch_layout(&self, track: &TrackKey, round: RoundRef) -> Result<Option<RawLayout>, OriginError> {
        let path = self.layout_path(track, round);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(OriginError::Io(e)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| OriginError::Payload(format!("{}: {}", path.display(), e)))
    }
}

/// Season results file shape: `season_{year}.json` with a `races` list, each
/// race optionally carrying its winner.
#[derive(Debug, Deserialize)]
struct SeasonFile {
    #[serde(default)]
    races: Vec<SeasonRace>,
}

#[derive(Debug, Deserialize)]
struct SeasonRace {
    round: u32,
    #[serde(default)]
    winner: Option<SeasonWinner>,
}

#[derive(Debug, Deserialize)]
struct SeasonWinner {
    #[serde(default)]
    driver: Option<String>,
    #[serde(default)]
    team: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Directory-backed results source reading per-season JSON files.
///
/// Missing or unreadable season files mean "no winner known" rather than an
/// error: results are enrichment, and the pipeline treats their absence as
/// partial data.
#[derive(Debug, Clone)]
pub struct SeasonResultsDir {
    root: PathBuf,
}

impl SeasonResultsDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn season_path(&self, year: i32) -> PathBuf {
        self.root.join(format!("season_{}.json", year))
    }
}

impl ResultsSource for SeasonResultsDir {
    fn race_winner(&self, round: RoundRef) -> Result<Option<WinnerRecord>, OriginError> {
        let path = self.season_path(round.year);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "season results unreadable, no winner");
                return Ok(None);
            }
        };

        let season: SeasonFile = match serde_json::from_str(&raw) {
            Ok(season) => season,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "season results corrupt, no winner");
                return Ok(None);
            }
        };

        let winner = season
            .races
            .into_iter()
            .find(|race| race.round == round.round)
            .and_then(|race| race.winner)
            .and_then(|w| {
                let driver = w.driver?;
                Some(WinnerRecord {
                    year: round.year,
                    round: round.round,
                    driver,
                    team: w.team.unwrap_or_default(),
                    code: w.code,
                })
            });

        Ok(winner)
    }
}
