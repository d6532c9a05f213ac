//! Layered configuration.
//!
//! Three layers, later wins: built-in defaults, an optional TOML file
//! (`apexmap.toml`, or the path given with `--config`), then environment
//! variables (`APEXMAP_DATA_DIR`, `APEXMAP_JOBS`). Directories default to
//! well-known names beneath the data root unless set explicitly.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::warmup::DEFAULT_JOBS;

/// Default data root, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = ".apexmap";

/// Default config file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "apexmap.toml";

/// Environment variable overriding the data root.
pub const ENV_DATA_DIR: &str = "APEXMAP_DATA_DIR";

/// Environment variable overriding the worker count.
pub const ENV_JOBS: &str = "APEXMAP_JOBS";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
}

/// Raw file layer; every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    bundle_dir: Option<PathBuf>,
    session_dir: Option<PathBuf>,
    results_dir: Option<PathBuf>,
    fixture_dir: Option<PathBuf>,
    inventory: Option<PathBuf>,
    jobs: Option<usize>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub data_dir: PathBuf,
    /// Snapshot bundle directory (read by the resolver, written by warmup).
    pub bundle_dir: PathBuf,
    /// Session cache directory.
    pub session_dir: PathBuf,
    /// Season results directory for Phase 2 winners.
    pub results_dir: PathBuf,
    /// Optional fixture-origin directory. When unset, the resolver runs with
    /// session and bundle tiers only.
    pub fixture_dir: Option<PathBuf>,
    /// Track inventory file.
    pub inventory: PathBuf,
    /// Phase 1 worker count.
    pub jobs: usize,
}

impl EffectiveConfig {
    /// Load configuration. An explicit `--config` path must exist; the
    /// default file is optional.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match explicit_path {
            Some(path) => Self::read_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::read_file(default)?
                } else {
                    ConfigFile::default()
                }
            }
        };
        Self::resolve(file)
    }

    fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    fn resolve(file: ConfigFile) -> Result<Self, ConfigError> {
        let data_dir = env::var_os(ENV_DATA_DIR)
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let jobs = match env::var(ENV_JOBS) {
            Ok(value) => value.parse::<usize>().map_err(|_| ConfigError::InvalidEnv {
                key: ENV_JOBS.to_string(),
                value,
            })?,
            Err(_) => file.jobs.unwrap_or(DEFAULT_JOBS),
        };

        Ok(Self {
            bundle_dir: file.bundle_dir.unwrap_or_else(|| data_dir.join("bundle")),
            session_dir: file.session_dir.unwrap_or_else(|| data_dir.join("session")),
            results_dir: file.results_dir.unwrap_or_else(|| data_dir.join("results")),
            fixture_dir: file.fixture_dir,
            inventory: file.inventory.unwrap_or_else(|| data_dir.join("tracks.json")),
            data_dir,
            jobs: jobs.max(1),
        })
    }
}
