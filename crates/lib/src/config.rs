//! Build configuration.
//!
//! Sources are layered: built-in defaults, then an optional JSON file, then
//! environment variables. The CLI applies its own flags last.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{DEFAULT_LOCK_WAIT_SECS, DEFAULT_LOG_CAP, DEFAULT_PASS_TIMEOUT_SECS, DEFAULT_SYNC_TIMEOUT_SECS};
use crate::engine::{EngineTable, ToolSpec};
use crate::platform::paths;

/// Environment variable overriding the per-pass timeout, in seconds.
pub const PASS_TIMEOUT_ENV: &str = "QUIRE_PASS_TIMEOUT";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid {name}: {value:?} is not a number of seconds")]
  InvalidEnv { name: &'static str, value: String },
}

/// Configuration for build and sync execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
  /// Timeout for every engine pass and bibliography run.
  pub pass_timeout_secs: u64,

  /// Timeout for a single SyncTeX query.
  pub sync_timeout_secs: u64,

  /// How long a build waits for another build of the same project.
  pub lock_wait_secs: u64,

  /// Maximum captured log size per build, in bytes.
  pub log_cap: usize,

  pub engines: EngineTable,

  pub bibtex: ToolSpec,

  pub biber: ToolSpec,

  /// SyncTeX command line utility. Its `args` are placed before the query
  /// arguments.
  pub synctex: ToolSpec,

  /// Root of the persisted artifact store.
  pub store_dir: PathBuf,

  /// Parent directory for per-job scratch directories.
  pub scratch_dir: PathBuf,
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      pass_timeout_secs: DEFAULT_PASS_TIMEOUT_SECS,
      sync_timeout_secs: DEFAULT_SYNC_TIMEOUT_SECS,
      lock_wait_secs: DEFAULT_LOCK_WAIT_SECS,
      log_cap: DEFAULT_LOG_CAP,
      engines: EngineTable::default(),
      bibtex: ToolSpec::new("bibtex", &["{outdir}/{stem}"]),
      biber: ToolSpec::new(
        "biber",
        &["--input-directory", "{outdir}", "--output-directory", "{outdir}", "{stem}"],
      ),
      synctex: ToolSpec::new("synctex", &[]),
      store_dir: paths::artifacts_dir(),
      scratch_dir: paths::scratch_dir(),
    }
  }
}

impl BuildConfig {
  /// Load a JSON config file. Missing fields keep their defaults; engine
  /// entries are layered over the default engine table.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    let mut config: BuildConfig = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    config.engines = EngineTable::default().overlay(config.engines);

    debug!(path = %path.display(), "loaded config");
    Ok(config)
  }

  /// Apply `QUIRE_PASS_TIMEOUT` if it is set.
  pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
    if let Ok(value) = std::env::var(PASS_TIMEOUT_ENV) {
      let secs = value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
        name: PASS_TIMEOUT_ENV,
        value: value.clone(),
      })?;
      self.pass_timeout_secs = secs;
    }
    Ok(self)
  }

  pub fn pass_timeout(&self) -> Duration {
    Duration::from_secs(self.pass_timeout_secs)
  }

  pub fn sync_timeout(&self) -> Duration {
    Duration::from_secs(self.sync_timeout_secs)
  }

  pub fn lock_wait(&self) -> Duration {
    Duration::from_secs(self.lock_wait_secs)
  }
}
