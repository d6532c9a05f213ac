//! Tiered layout resolution.
//!
//! Resolution walks an ordered list of tiers behind one capability
//! interface: the ephemeral session cache, the read-only snapshot bundle,
//! and (when configured) the live origin. The first tier that answers wins.
//! Keeping the tiers behind `LayoutTier` means adding or reordering them is
//! a construction-time change, not a control-flow rewrite.
//!
//! Every failure below this layer degrades: corrupt documents read as
//! absent, origin faults become a miss, session write-backs that fail are
//! logged and forgotten. `resolve` returns `None` only when all tiers came
//! up empty, which is the explicit not-found outcome.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use apexmap_model::{RoundEntry, RoundRef, TrackKey};

use crate::origin::OriginProvider;
use crate::session::{SessionCache, SessionKey};
use crate::store::SnapshotStore;

/// Which tier produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Session,
    Bundle,
    Origin,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Session => f.write_str("session"),
            Provenance::Bundle => f.write_str("bundle"),
            Provenance::Origin => f.write_str("origin"),
        }
    }
}

/// A successful resolution: the entry, the round it actually describes
/// (which may differ from the requested one), and where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedLayout {
    pub entry: RoundEntry,
    pub round: RoundRef,
    pub provenance: Provenance,
}

/// A tier answer before provenance is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct TierHit {
    pub entry: RoundEntry,
    pub round: RoundRef,
}

/// One lookup tier. Implementations degrade internally: any fault is a
/// logged miss, never an error to the resolver.
pub trait LayoutTier {
    fn provenance(&self) -> Provenance;
    fn lookup(&self, track: &TrackKey, round: RoundRef) -> Option<TierHit>;
}

struct SessionTier {
    cache: Arc<SessionCache>,
}

impl LayoutTier for SessionTier {
    fn provenance(&self) -> Provenance {
        Provenance::Session
    }

    fn lookup(&self, track: &TrackKey, round: RoundRef) -> Option<TierHit> {
        let key = SessionKey::new(track.clone(), round);
        let entry = self.cache.get(&key)?;
        let round = entry.round;
        Some(TierHit { entry, round })
    }
}

struct BundleTier {
    store: SnapshotStore,
}

impl LayoutTier for BundleTier {
    fn provenance(&self) -> Provenance {
        Provenance::Bundle
    }

    fn lookup(&self, track: &TrackKey, round: RoundRef) -> Option<TierHit> {
        let doc = self.store.load(track)?;

        // Exact round first; an entry without point geometry counts as
        // absent here too.
        if let Some(entry) = doc.entry_for(round) {
            if entry.has_geometry() {
                return Some(TierHit { entry: entry.clone(), round });
            }
        }

        // Fallback-to-latest: serve the greatest retained round rather than
        // failing, and report the round actually served.
        let latest = doc.latest_with_geometry()?;
        Some(TierHit { entry: latest.clone(), round: latest.round })
    }
}

struct OriginTier {
    origin: Box<dyn OriginProvider>,
}

impl LayoutTier for OriginTier {
    fn provenance(&self) -> Provenance {
        Provenance::Origin
    }

    fn lookup(&self, track: &TrackKey, round: RoundRef) -> Option<TierHit> {
        let raw = match self.origin.fetch_layout(track, round) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(track = %track, %round, error = %e, "origin fetch failed, reporting not found");
                return None;
            }
        };

        let resolved = raw.round;
        match RoundEntry::from_geometry(
            raw.round,
            raw.layout_label,
            raw.layout_length,
            raw.points,
            raw.corners,
        ) {
            Ok(entry) => Some(TierHit { entry, round: resolved }),
            Err(e) => {
                warn!(track = %track, %round, error = %e, "origin payload unusable, reporting not found");
                None
            }
        }
    }
}

/// The tiered resolver consumed by the UI layer.
pub struct TieredResolver {
    session: Arc<SessionCache>,
    tiers: Vec<Box<dyn LayoutTier>>,
}

impl TieredResolver {
    /// Standard tier order: session cache, snapshot bundle, then the origin
    /// when one is configured.
    pub fn new(session: SessionCache, store: SnapshotStore, origin: Option<Box<dyn OriginProvider>>) -> Self {
        let session = Arc::new(session);
        let mut tiers: Vec<Box<dyn LayoutTier>> = vec![
            Box::new(SessionTier { cache: Arc::clone(&session) }),
            Box::new(BundleTier { store }),
        ];
        if let Some(origin) = origin {
            tiers.push(Box::new(OriginTier { origin }));
        }
        Self { session, tiers }
    }

    /// Assemble a resolver from an explicit tier list (tests, alternative
    /// orderings). Hits from non-session tiers are still written back.
    pub fn with_tiers(session: SessionCache, tiers: Vec<Box<dyn LayoutTier>>) -> Self {
        Self { session: Arc::new(session), tiers }
    }

    /// Resolve a layout for `(track, requested)`.
    ///
    /// `None` is the explicit not-found outcome: the key was absent at every
    /// tier. All lower-level faults have already degraded by the time this
    /// returns.
    pub fn resolve(&self, track: &TrackKey, requested: RoundRef) -> Option<ResolvedLayout> {
        if track.is_empty() {
            warn!("resolve called with the empty track key, reporting not found");
            return None;
        }

        for tier in &self.tiers {
            let Some(hit) = tier.lookup(track, requested) else { continue };
            let provenance = tier.provenance();

            if provenance != Provenance::Session {
                self.write_back(track, requested, &hit);
            }

            return Some(ResolvedLayout {
                round: hit.round,
                provenance,
                entry: hit.entry,
            });
        }

        None
    }

    /// Populate the session cache under the requested round and, when the
    /// tier answered with a different one, under the resolved round as well.
    fn write_back(&self, track: &TrackKey, requested: RoundRef, hit: &TierHit) {
        let mut keys = vec![SessionKey::new(track.clone(), requested)];
        if hit.round != requested {
            keys.push(SessionKey::new(track.clone(), hit.round));
        }
        for key in keys {
            if let Err(e) = self.session.put(&key, &hit.entry) {
                warn!(track = %track, round = %key.round, error = %e, "session write-back failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::TempDir;

    use apexmap_model::{SnapshotDocument, TrackPoint};

    use crate::origin::{OriginError, RawLayout};

    fn entry(year: i32, round: u32) -> RoundEntry {
        RoundEntry::from_geometry(
            RoundRef::new(year, round),
            "GP Circuit",
            5.0,
            vec![TrackPoint::new(0.0, 0.0), TrackPoint::new(1.0, 1.0)],
            vec![],
        )
        .unwrap()
    }

    fn store_with_doc(dir: &TempDir, name: &str, rounds: &[(i32, u32)]) -> SnapshotStore {
        let store = SnapshotStore::new(dir.path().join("bundle"));
        let mut doc = SnapshotDocument::new(TrackKey::derive(name));
        for &(year, round) in rounds {
            doc.insert(entry(year, round));
        }
        store.save(&doc).unwrap();
        store
    }

    /// Origin that counts calls and always answers for the requested round.
    struct CountingOrigin {
        calls: Arc<AtomicUsize>,
    }

    impl OriginProvider for CountingOrigin {
        fn fetch_layout(&self, _track: &TrackKey, round: RoundRef) -> Result<Option<RawLayout>, OriginError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(RawLayout {
                round,
                layout_label: "From Origin".to_string(),
                layout_length: 4.2,
                points: vec![TrackPoint::new(9.0, 9.0), TrackPoint::new(8.0, 8.0)],
                corners: vec![],
            }))
        }
    }

    struct FailingOrigin;

    impl OriginProvider for FailingOrigin {
        fn fetch_layout(&self, _track: &TrackKey, _round: RoundRef) -> Result<Option<RawLayout>, OriginError> {
            Err(OriginError::Payload("rate limited".to_string()))
        }
    }

    #[test]
    fn test_bundle_exact_hit() {
        let dir = TempDir::new().unwrap();
        let store = store_with_doc(&dir, "Monaco", &[(2019, 6), (2021, 8)]);
        let session = SessionCache::open(dir.path().join("session")).unwrap();
        let resolver = TieredResolver::new(session, store, None);

        let got = resolver.resolve(&TrackKey::derive("Monaco"), RoundRef::new(2019, 6)).unwrap();
        assert_eq!(got.round, RoundRef::new(2019, 6));
        assert_eq!(got.provenance, Provenance::Bundle);
    }

    #[test]
    fn test_bundle_fallback_reports_actual_round() {
        let dir = TempDir::new().unwrap();
        let store = store_with_doc(&dir, "Monaco", &[(2019, 6), (2021, 8)]);
        let session = SessionCache::open(dir.path().join("session")).unwrap();
        let resolver = TieredResolver::new(session, store, None);

        // 2020-8 was never held (cancelled event); the greatest retained
        // round must be served and reported.
        let got = resolver.resolve(&TrackKey::derive("Monaco"), RoundRef::new(2020, 8)).unwrap();
        assert_eq!(got.round, RoundRef::new(2021, 8));
        assert_eq!(got.provenance, Provenance::Bundle);
    }

    #[test]
    fn test_session_hit_short_circuits_origin() {
        let dir = TempDir::new().unwrap();
        let store = store_with_doc(&dir, "Monaco", &[(2021, 8)]);
        let session = SessionCache::open(dir.path().join("session")).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let origin = CountingOrigin { calls: Arc::clone(&calls) };
        let resolver = TieredResolver::new(session, store, Some(Box::new(origin)));

        let track = TrackKey::derive("Monaco");
        let round = RoundRef::new(2021, 8);

        // First resolve comes from the bundle and populates the session.
        let first = resolver.resolve(&track, round).unwrap();
        assert_eq!(first.provenance, Provenance::Bundle);

        // Second resolve must be a session hit: no origin call either time.
        let second = resolver.resolve(&track, round).unwrap();
        assert_eq!(second.provenance, Provenance::Session);
        assert_eq!(second.entry, first.entry);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_origin_reached_only_when_bundle_empty() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("bundle"));
        let session = SessionCache::open(dir.path().join("session")).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let origin = CountingOrigin { calls: Arc::clone(&calls) };
        let resolver = TieredResolver::new(session, store, Some(Box::new(origin)));

        let track = TrackKey::derive("Jeddah");
        let round = RoundRef::new(2023, 2);

        let got = resolver.resolve(&track, round).unwrap();
        assert_eq!(got.provenance, Provenance::Origin);
        assert_eq!(got.round, round);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The answer was written back: the next resolve is a session hit.
        let again = resolver.resolve(&track, round).unwrap();
        assert_eq!(again.provenance, Provenance::Session);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_origin_failure_degrades_to_not_found() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("bundle"));
        let session = SessionCache::open(dir.path().join("session")).unwrap();
        let resolver = TieredResolver::new(session, store, Some(Box::new(FailingOrigin)));

        let got = resolver.resolve(&TrackKey::derive("Jeddah"), RoundRef::new(2023, 2));
        assert!(got.is_none());
    }

    #[test]
    fn test_empty_key_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("bundle"));
        let session = SessionCache::open(dir.path().join("session")).unwrap();
        let resolver = TieredResolver::new(session, store, None);

        assert!(resolver.resolve(&TrackKey::empty(), RoundRef::new(2021, 8)).is_none());
    }

    #[test]
    fn test_all_tiers_empty_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("bundle"));
        let session = SessionCache::open(dir.path().join("session")).unwrap();
        let resolver = TieredResolver::new(session, store, None);

        assert!(resolver.resolve(&TrackKey::derive("Monaco"), RoundRef::new(2021, 8)).is_none());
    }

    #[test]
    fn test_geometry_less_exact_entry_falls_back() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("bundle"));
        let mut doc = SnapshotDocument::new(TrackKey::derive("Monaco"));
        doc.insert(entry(2019, 6));
        // Exact match exists but carries no points.
        doc.insert(
            RoundEntry::from_geometry(RoundRef::new(2022, 7), "GP Circuit", 5.0, vec![], vec![]).unwrap(),
        );
        store.save(&doc).unwrap();

        let session = SessionCache::open(dir.path().join("session")).unwrap();
        let resolver = TieredResolver::new(session, store, None);

        let got = resolver.resolve(&TrackKey::derive("Monaco"), RoundRef::new(2022, 7)).unwrap();
        assert_eq!(got.round, RoundRef::new(2019, 6));
        assert!(got.entry.has_geometry());
    }
}
