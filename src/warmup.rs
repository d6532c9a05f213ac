//! Two-phase snapshot warmup.
//!
//! Phase 1 walks the track inventory and fetches raw geometry for every
//! event that is not already cached, on a bounded pool of worker threads.
//! Workers only fetch; the collector applies results and writes documents,
//! so each track file has exactly one writer. Phase 2 (behind the `enhanced`
//! flag) attaches track-level metadata (winner history, layout variants,
//! flattened years) into every entry of every track that has at least one
//! cached round.
//!
//! Both phases are idempotent: re-running Phase 1 counts existing entries as
//! cached instead of refetching, and Phase 2 recomputes and overwrites the
//! same metadata given the same inputs. A failing event is recorded and
//! skipped; it never aborts the batch.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use apexmap_cluster::{cluster_variants, flatten_years};
use apexmap_model::{RoundEntry, RoundRef, SnapshotDocument, TrackKey, WinnerRecord};

use crate::inventory::TrackInventory;
use crate::origin::{OriginError, OriginProvider, RawLayout, ResultsSource};
use crate::store::{SnapshotStore, StoreError};

/// Default Phase 1 worker count.
pub const DEFAULT_JOBS: usize = 4;

/// Warmup options.
#[derive(Debug, Clone)]
pub struct WarmupOptions {
    /// Run Phase 2 enrichment after Phase 1.
    pub enhanced: bool,
    /// Phase 1 worker thread count (clamped to at least 1).
    pub jobs: usize,
}

impl Default for WarmupOptions {
    fn default() -> Self {
        Self { enhanced: false, jobs: DEFAULT_JOBS }
    }
}

/// Errors that abort the batch. Per-event fetch failures never do; they are
/// recorded in the report instead.
#[derive(Debug, Error)]
pub enum WarmupError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// One recorded per-event failure.
#[derive(Debug, Clone, Serialize)]
pub struct EventFailure {
    pub round: RoundRef,
    pub reason: String,
}

/// Per-track outcome counts.
#[derive(Debug, Clone, Serialize)]
pub struct TrackReport {
    pub key: TrackKey,
    pub name: String,
    /// Entries fetched and stored this run.
    pub loaded: usize,
    /// Entries already present with usable geometry.
    pub cached: usize,
    /// Entries that received Phase 2 metadata this run.
    pub enhanced: usize,
    /// Events whose fetch failed or yielded no usable geometry.
    pub failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<EventFailure>,
    /// True when Phase 2 skipped this track for having no cached rounds.
    pub skipped_enrichment: bool,
}

impl TrackReport {
    fn new(key: TrackKey, name: String) -> Self {
        Self {
            key,
            name,
            loaded: 0,
            cached: 0,
            enhanced: 0,
            failed: 0,
            failures: Vec::new(),
            skipped_enrichment: false,
        }
    }
}

/// Aggregated counts across the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WarmupTotals {
    pub loaded: usize,
    pub cached: usize,
    pub enhanced: usize,
    pub failed: usize,
}

/// The full batch report.
#[derive(Debug, Clone, Serialize)]
pub struct WarmupReport {
    pub started_at: String,
    pub enhanced_run: bool,
    pub tracks: Vec<TrackReport>,
}

impl WarmupReport {
    pub fn totals(&self) -> WarmupTotals {
        let mut totals = WarmupTotals { loaded: 0, cached: 0, enhanced: 0, failed: 0 };
        for t in &self.tracks {
            totals.loaded += t.loaded;
            totals.cached += t.cached;
            totals.enhanced += t.enhanced;
            totals.failed += t.failed;
        }
        totals
    }
}

/// Outcome of one worker fetch, routed back to the collector.
struct FetchOutcome {
    track_idx: usize,
    round: RoundRef,
    result: Result<Option<RawLayout>, OriginError>,
}

/// The batch warmup pipeline. Holds the store it writes, the origin it
/// fetches geometry from, and the results source Phase 2 reads winners from.
pub struct WarmupPipeline<'a> {
    store: &'a SnapshotStore,
    origin: &'a dyn OriginProvider,
    results: &'a dyn ResultsSource,
}

impl<'a> WarmupPipeline<'a> {
    pub fn new(
        store: &'a SnapshotStore,
        origin: &'a dyn OriginProvider,
        results: &'a dyn ResultsSource,
    ) -> Self {
        Self { store, origin, results }
    }

    /// Run the batch over the inventory.
    pub fn run(&self, inventory: &TrackInventory, opts: &WarmupOptions) -> Result<WarmupReport, WarmupError> {
        let started_at = chrono::Utc::now().to_rfc3339();

        let mut docs: Vec<SnapshotDocument> = inventory
            .tracks
            .iter()
            .map(|t| {
                self.store
                    .load(&t.key)
                    .unwrap_or_else(|| SnapshotDocument::new(t.key.clone()))
            })
            .collect();
        let mut reports: Vec<TrackReport> = inventory
            .tracks
            .iter()
            .map(|t| TrackReport::new(t.key.clone(), t.name.clone()))
            .collect();

        self.run_phase1(inventory, opts, &mut docs, &mut reports)?;

        if opts.enhanced {
            self.run_phase2(inventory, &mut docs, &mut reports)?;
        }

        let report = WarmupReport {
            started_at,
            enhanced_run: opts.enhanced,
            tracks: reports,
        };
        let totals = report.totals();
        info!(
            loaded = totals.loaded,
            cached = totals.cached,
            enhanced = totals.enhanced,
            failed = totals.failed,
            "warmup finished"
        );
        Ok(report)
    }

    fn run_phase1(
        &self,
        inventory: &TrackInventory,
        opts: &WarmupOptions,
        docs: &mut [SnapshotDocument],
        reports: &mut [TrackReport],
    ) -> Result<(), WarmupError> {
        let mut tasks: VecDeque<(usize, RoundRef)> = VecDeque::new();
        for (idx, track) in inventory.tracks.iter().enumerate() {
            for &round in &track.events {
                match docs[idx].entry_for(round) {
                    Some(entry) if entry.has_geometry() => reports[idx].cached += 1,
                    // Absent, or present without geometry: (re)fetch.
                    _ => tasks.push_back((idx, round)),
                }
            }
        }

        if tasks.is_empty() {
            info!("phase 1: nothing to fetch");
            return Ok(());
        }

        let worker_count = opts.jobs.max(1).min(tasks.len());
        info!(tasks = tasks.len(), workers = worker_count, "phase 1: fetching geometry");

        let queue = Mutex::new(tasks);
        let (tx, rx) = mpsc::channel::<FetchOutcome>();
        let origin = self.origin;
        let tracks = &inventory.tracks;

        thread::scope(|scope| {
            for _ in 0..worker_count {
                let tx = tx.clone();
                let queue = &queue;
                scope.spawn(move || loop {
                    let task = {
                        let Ok(mut queue) = queue.lock() else { break };
                        queue.pop_front()
                    };
                    let Some((track_idx, round)) = task else { break };

                    let result = origin.fetch_layout(&tracks[track_idx].key, round);
                    if tx.send(FetchOutcome { track_idx, round, result }).is_err() {
                        break;
                    }
                });
            }
            drop(tx);

            // The collector is the only writer of docs and reports.
            for outcome in rx {
                Self::apply_fetch(outcome, docs, reports);
            }
        });

        for (idx, report) in reports.iter().enumerate() {
            if report.loaded > 0 {
                self.store.save(&docs[idx])?;
            }
        }
        Ok(())
    }

    /// Fold one fetch outcome into the per-track document and report.
    fn apply_fetch(outcome: FetchOutcome, docs: &mut [SnapshotDocument], reports: &mut [TrackReport]) {
        let FetchOutcome { track_idx, round, result } = outcome;
        let report = &mut reports[track_idx];

        let fail = |report: &mut TrackReport, reason: String| {
            warn!(track = %report.key, %round, reason = %reason, "phase 1: event failed");
            report.failed += 1;
            report.failures.push(EventFailure { round, reason });
        };

        match result {
            Ok(Some(raw)) if raw.points.is_empty() => {
                fail(report, "origin returned empty geometry".to_string());
            }
            Ok(Some(raw)) => {
                // The inventory round is the event identity here, whatever
                // round the origin believes it answered.
                match RoundEntry::from_geometry(
                    round,
                    raw.layout_label,
                    raw.layout_length,
                    raw.points,
                    raw.corners,
                ) {
                    Ok(entry) => {
                        docs[track_idx].insert(entry);
                        report.loaded += 1;
                    }
                    Err(e) => fail(report, e.to_string()),
                }
            }
            Ok(None) => fail(report, "origin has no data for this event".to_string()),
            Err(e) => fail(report, e.to_string()),
        }
    }

    fn run_phase2(
        &self,
        inventory: &TrackInventory,
        docs: &mut [SnapshotDocument],
        reports: &mut [TrackReport],
    ) -> Result<(), WarmupError> {
        for (idx, track) in inventory.tracks.iter().enumerate() {
            let doc = &mut docs[idx];
            if doc.round_count() == 0 {
                reports[idx].skipped_enrichment = true;
                info!(track = %track.key, "phase 2: no cached rounds, skipping");
                continue;
            }

            let mut winners: Vec<WinnerRecord> = track
                .events
                .iter()
                .filter_map(|&round| match self.results.race_winner(round) {
                    Ok(winner) => winner,
                    Err(e) => {
                        warn!(track = %track.key, %round, error = %e, "phase 2: winner lookup failed");
                        None
                    }
                })
                .collect();
            winners.sort_by_key(|w| w.round_ref());

            let variants = cluster_variants(doc.entries.values());
            let years = flatten_years(&variants);

            for entry in doc.entries.values_mut() {
                entry.winner = winners.iter().find(|w| w.round_ref() == entry.round).cloned();
                entry.winners = winners.clone();
                entry.layout_variants = variants.clone();
                entry.layout_years = years.clone();
                reports[idx].enhanced += 1;
            }

            self.store.save(doc)?;
        }
        Ok(())
    }
}
