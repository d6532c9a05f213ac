//! apexmap: offline-capable track-layout snapshot store and tiered
//! resolver.
//!
//! The warmup pipeline builds per-track snapshot documents (geometry plus
//! winner/variant metadata); at request time the tiered resolver serves
//! layout records from the session cache, the snapshot bundle, or the live
//! origin, in that order, degrading to the best available layer.

pub mod config;
pub mod inventory;
pub mod origin;
pub mod resolver;
pub mod session;
pub mod store;
pub mod warmup;

pub use config::EffectiveConfig;
pub use inventory::TrackInventory;
pub use origin::{FixtureOrigin, OriginProvider, ResultsSource, SeasonResultsDir};
pub use resolver::{Provenance, ResolvedLayout, TieredResolver};
pub use session::{SessionCache, SessionKey};
pub use store::SnapshotStore;
pub use warmup::{WarmupOptions, WarmupPipeline, WarmupReport};
