//! apexmap CLI
//!
//! Entry point for the `apexmap` command-line tool: snapshot warmup, cache
//! status, tiered resolution, and session purge.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use apexmap::config::EffectiveConfig;
use apexmap::inventory::TrackInventory;
use apexmap::origin::{FixtureOrigin, SeasonResultsDir};
use apexmap::resolver::TieredResolver;
use apexmap::session::SessionCache;
use apexmap::store::SnapshotStore;
use apexmap::warmup::{WarmupOptions, WarmupPipeline};
use apexmap_model::{RoundRef, TrackKey};

#[derive(Parser)]
#[command(name = "apexmap")]
#[command(about = "Offline-capable track-layout snapshot store and resolver", version)]
struct Cli {
    /// Path to config file (default: apexmap.toml if present)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the snapshot store from the track inventory
    Warmup {
        /// Also run Phase 2 enrichment (winners, layout variants)
        #[arg(long)]
        enhanced: bool,

        /// Worker thread count for geometry fetches
        #[arg(long, short = 'j')]
        jobs: Option<usize>,

        /// Output the report in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show per-track snapshot presence and round counts
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Resolve a track layout for one season and round
    Resolve {
        /// Track display name or canonical key
        track: String,

        /// Season year
        year: i32,

        /// Round number
        round: u32,

        /// Output the resolved entry in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Clear the ephemeral session cache
    Purge,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Warmup { enhanced, jobs, json } => run_warmup(&config, enhanced, jobs, json),
        Commands::Status { json } => run_status(&config, json),
        Commands::Resolve { track, year, round, json } => run_resolve(&config, &track, year, round, json),
        Commands::Purge => run_purge(&config),
    }
}

fn load_config(path: Option<&std::path::Path>) -> EffectiveConfig {
    match EffectiveConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    }
}

fn load_inventory(config: &EffectiveConfig) -> TrackInventory {
    match TrackInventory::load(&config.inventory) {
        Ok(inventory) => inventory,
        Err(e) => {
            eprintln!("Error loading track inventory: {}", e);
            process::exit(1);
        }
    }
}

fn run_warmup(config: &EffectiveConfig, enhanced: bool, jobs: Option<usize>, json: bool) {
    let inventory = load_inventory(config);
    let store = SnapshotStore::new(&config.bundle_dir);

    let Some(fixture_dir) = config.fixture_dir.as_ref() else {
        eprintln!("Error: no origin configured (set fixture_dir in apexmap.toml)");
        process::exit(1);
    };
    let origin = FixtureOrigin::new(fixture_dir);
    let results = SeasonResultsDir::new(&config.results_dir);

    let opts = WarmupOptions {
        enhanced,
        jobs: jobs.unwrap_or(config.jobs),
    };

    let pipeline = WarmupPipeline::new(&store, &origin, &results);
    let report = match pipeline.run(&inventory, &opts) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error during warmup: {}", e);
            process::exit(1);
        }
    };

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Error serializing report: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    for track in &report.tracks {
        println!(
            "{}: loaded {}, cached {}, enhanced {}, failed {}{}",
            track.key,
            track.loaded,
            track.cached,
            track.enhanced,
            track.failed,
            if track.skipped_enrichment { " (enrichment skipped)" } else { "" }
        );
        for failure in &track.failures {
            println!("  failed {}: {}", failure.round, failure.reason);
        }
    }
    let totals = report.totals();
    println!(
        "total: loaded {}, cached {}, enhanced {}, failed {}",
        totals.loaded, totals.cached, totals.enhanced, totals.failed
    );
}

fn run_status(config: &EffectiveConfig, json: bool) {
    let inventory = load_inventory(config);
    let store = SnapshotStore::new(&config.bundle_dir);

    if json {
        let rows: Vec<serde_json::Value> = inventory
            .tracks
            .iter()
            .map(|track| {
                let status = store.status(&track.key);
                serde_json::json!({
                    "key": &track.key,
                    "name": &track.name,
                    "exists": status.exists,
                    "rounds": status.rounds,
                })
            })
            .collect();
        match serde_json::to_string_pretty(&rows) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Error serializing status: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    for track in &inventory.tracks {
        let status = store.status(&track.key);
        if status.exists {
            println!("{}: {} rounds", track.key, status.rounds);
        } else {
            println!("{}: no snapshot", track.key);
        }
    }
}

fn run_resolve(config: &EffectiveConfig, track: &str, year: i32, round: u32, json: bool) {
    // derive is idempotent, so both display names and canonical keys work.
    let key = TrackKey::derive(track);
    if key.is_empty() {
        eprintln!("Error: {:?} does not derive to a usable track key", track);
        process::exit(1);
    }

    let session = match SessionCache::open(&config.session_dir) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error opening session cache: {}", e);
            process::exit(1);
        }
    };
    let store = SnapshotStore::new(&config.bundle_dir);
    let origin = config
        .fixture_dir
        .as_ref()
        .map(|dir| Box::new(FixtureOrigin::new(dir)) as Box<dyn apexmap::OriginProvider>);

    let resolver = TieredResolver::new(session, store, origin);
    let requested = RoundRef::new(year, round);

    let Some(resolved) = resolver.resolve(&key, requested) else {
        eprintln!("{} {}: not found in any tier", key, requested);
        process::exit(2);
    };

    if json {
        match serde_json::to_string_pretty(&resolved) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Error serializing resolution: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    println!("{} {} ({})", key, resolved.round, resolved.provenance);
    if resolved.round != requested {
        println!("  requested {} was not available", requested);
    }
    println!("  label:  {}", resolved.entry.layout_label);
    println!("  length: {}", resolved.entry.layout_length);
    println!(
        "  points: {}, corners: {}",
        resolved.entry.points.len(),
        resolved.entry.corners.len()
    );
    if let Some(winner) = &resolved.entry.winner {
        println!("  winner: {} ({})", winner.driver, winner.team);
    }
}

fn run_purge(config: &EffectiveConfig) {
    let session = match SessionCache::open(&config.session_dir) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error opening session cache: {}", e);
            process::exit(1);
        }
    };
    match session.purge_all() {
        Ok(purged) => println!("purged {} session entries", purged),
        Err(e) => {
            eprintln!("Error purging session cache: {}", e);
            process::exit(1);
        }
    }
}
