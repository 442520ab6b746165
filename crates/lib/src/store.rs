//! Persisted build artifacts.
//!
//! The scratch directory of a build disappears with the job. What later
//! builds and SyncTeX queries need survives here, one slot per project.
//!
//! # Storage Layout
//!
//! ```text
//! {store_dir}/
//! ├── <project-key>/
//! │   ├── build.json          # BuildRecord
//! │   ├── paper.pdf           # artifact
//! │   ├── paper.synctex.gz    # sync-map (when the engine wrote one)
//! │   └── paper.aux, .bbl ... # intermediates reused by the next build
//! └── <project-key>.lock      # ProjectLock
//! ```
//!
//! Slots are replaced whole: files are written to a staging directory that
//! is renamed into place, so readers never see a half-written slot.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::consts::PROJECT_KEY_LEN;

pub const RECORD_FILENAME: &str = "build.json";

pub const RECORD_VERSION: u32 = 1;

/// Intermediate file suffixes carried from one build to the next.
pub const INTERMEDIATE_SUFFIXES: &[&str] = &["aux", "bbl", "bcf", "run.xml"];

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("failed to create {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to copy {from} to {to}: {source}")]
  Copy {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse build record {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize build record: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported build record version {0}")]
  UnsupportedVersion(u32),
}

/// Stable identifier of a project in the store.
///
/// A 20-character prefix of the SHA-256 of the project root path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectKey(pub String);

impl ProjectKey {
  pub fn for_root(root: &Path) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(root.to_string_lossy().as_bytes());
    let full = hex::encode(hasher.finalize());
    Self(full[..PROJECT_KEY_LEN].to_string())
  }
}

impl std::fmt::Display for ProjectKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Metadata describing a persisted build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
  pub version: u32,
  pub project_root: PathBuf,
  pub main_file: PathBuf,
  pub stem: String,
  pub engine: String,
  /// Artifact file name within the slot.
  pub artifact: String,
  /// Sync-map file name within the slot, if one was persisted.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sync_map: Option<String>,
  pub created_at_unix: u64,
}

impl BuildRecord {
  pub fn new(project_root: &Path, main_file: &Path, stem: &str, engine: &str) -> Self {
    Self {
      version: RECORD_VERSION,
      project_root: project_root.to_path_buf(),
      main_file: main_file.to_path_buf(),
      stem: stem.to_string(),
      engine: engine.to_string(),
      artifact: artifact_name(stem),
      sync_map: None,
      created_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
    }
  }
}

/// A loaded slot.
#[derive(Debug, Clone)]
pub struct PersistedBuild {
  pub dir: PathBuf,
  pub record: BuildRecord,
}

impl PersistedBuild {
  pub fn artifact_path(&self) -> PathBuf {
    self.dir.join(&self.record.artifact)
  }

  /// Path of the persisted sync-map, if the record has one and it is still
  /// on disk.
  pub fn sync_map_path(&self) -> Option<PathBuf> {
    let name = self.record.sync_map.as_ref()?;
    let path = self.dir.join(name);
    path.is_file().then_some(path)
  }
}

pub fn artifact_name(stem: &str) -> String {
  format!("{}.pdf", stem)
}

pub fn sync_map_name(stem: &str) -> String {
  format!("{}.synctex.gz", stem)
}

/// Manages the per-project slots on disk.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
  base_path: PathBuf,
}

impl ArtifactStore {
  pub fn new(base_path: PathBuf) -> Self {
    Self { base_path }
  }

  pub fn slot_dir(&self, key: &ProjectKey) -> PathBuf {
    self.base_path.join(&key.0)
  }

  pub fn lock_path(&self, key: &ProjectKey) -> PathBuf {
    self.base_path.join(format!("{}.lock", key.0))
  }

  /// Load the slot for `key`.
  ///
  /// Returns `Ok(None)` if the project has never been persisted.
  pub fn load(&self, key: &ProjectKey) -> Result<Option<PersistedBuild>, StoreError> {
    let dir = self.slot_dir(key);
    let path = dir.join(RECORD_FILENAME);

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => return Err(StoreError::Read { path, source }),
    };

    let record: BuildRecord = serde_json::from_str(&content).map_err(|source| StoreError::Parse {
      path: path.clone(),
      source,
    })?;

    if record.version != RECORD_VERSION {
      return Err(StoreError::UnsupportedVersion(record.version));
    }

    Ok(Some(PersistedBuild { dir, record }))
  }

  /// Replace the slot for `key` with the artifact, sync-map and
  /// intermediates found in `scratch`.
  ///
  /// The artifact is required; the sync-map and intermediates are copied
  /// when present. `record.sync_map` is filled in here.
  pub fn persist(&self, key: &ProjectKey, mut record: BuildRecord, scratch: &Path) -> Result<PersistedBuild, StoreError> {
    let slot = self.slot_dir(key);
    let staging = self
      .base_path
      .join(format!("{}.staging-{}", key.0, std::process::id()));

    remove_dir_if_exists(&staging)?;
    fs::create_dir_all(&staging).map_err(|source| StoreError::CreateDir {
      path: staging.clone(),
      source,
    })?;

    let result = self.fill_staging(&staging, &mut record, scratch);
    if let Err(e) = result {
      let _ = fs::remove_dir_all(&staging);
      return Err(e);
    }

    let retired = self.base_path.join(format!("{}.old-{}", key.0, std::process::id()));
    remove_dir_if_exists(&retired)?;
    if slot.exists() {
      fs::rename(&slot, &retired).map_err(|source| StoreError::Write {
        path: slot.clone(),
        source,
      })?;
    }
    fs::rename(&staging, &slot).map_err(|source| StoreError::Write {
      path: slot.clone(),
      source,
    })?;
    if let Err(e) = fs::remove_dir_all(&retired)
      && e.kind() != io::ErrorKind::NotFound
    {
      warn!(path = %retired.display(), error = %e, "failed to remove retired slot");
    }

    debug!(key = %key, sync_map = record.sync_map.is_some(), "persisted build");
    Ok(PersistedBuild { dir: slot, record })
  }

  fn fill_staging(&self, staging: &Path, record: &mut BuildRecord, scratch: &Path) -> Result<(), StoreError> {
    copy_file(&scratch.join(&record.artifact), &staging.join(&record.artifact))?;

    let sync_map = sync_map_name(&record.stem);
    let sync_src = scratch.join(&sync_map);
    if sync_src.is_file() {
      copy_file(&sync_src, &staging.join(&sync_map))?;
      record.sync_map = Some(sync_map);
    }

    for name in carried_names(scratch, &record.stem) {
      let src = scratch.join(&name);
      if src.is_file() {
        copy_file(&src, &staging.join(&name))?;
      }
    }

    let path = staging.join(RECORD_FILENAME);
    let content = serde_json::to_string_pretty(record).map_err(StoreError::Serialize)?;
    fs::write(&path, content).map_err(|source| StoreError::Write { path, source })
  }

  /// Copy the persisted intermediates of `stem` into `dest`.
  ///
  /// Best effort: individual copy failures are logged and skipped. Returns
  /// the number of files copied.
  pub fn seed_intermediates(&self, key: &ProjectKey, stem: &str, dest: &Path) -> usize {
    let slot = self.slot_dir(key);
    let mut copied = 0;

    for name in carried_names(&slot, stem) {
      let src = slot.join(&name);
      if !src.is_file() {
        continue;
      }
      match fs::copy(&src, dest.join(&name)) {
        Ok(_) => copied += 1,
        Err(e) => warn!(file = %name, error = %e, "failed to seed intermediate"),
      }
    }

    debug!(key = %key, copied, "seeded intermediates");
    copied
  }

  /// Remove the intermediates of `stem` from the slot, leaving the artifact
  /// and sync-map queryable.
  pub fn clear_intermediates(&self, key: &ProjectKey, stem: &str) {
    let slot = self.slot_dir(key);
    for name in carried_names(&slot, stem) {
      let path = slot.join(&name);
      if let Err(e) = fs::remove_file(&path)
        && e.kind() != io::ErrorKind::NotFound
      {
        warn!(path = %path.display(), error = %e, "failed to remove intermediate");
      }
    }
  }

  /// Remove the whole slot. Returns whether anything was removed.
  pub fn clear(&self, key: &ProjectKey) -> Result<bool, StoreError> {
    let slot = self.slot_dir(key);
    if !slot.exists() {
      return Ok(false);
    }
    remove_dir_if_exists(&slot)?;
    Ok(true)
  }
}

fn intermediate_names(stem: &str) -> impl Iterator<Item = String> + '_ {
  INTERMEDIATE_SUFFIXES.iter().map(move |suffix| format!("{}.{}", stem, suffix))
}

/// Intermediates of `stem` plus every other aux file directly in `dir`, so
/// `\include`d chapters keep their citation records between builds.
fn carried_names(dir: &Path, stem: &str) -> BTreeSet<String> {
  let mut names: BTreeSet<String> = intermediate_names(stem).collect();
  if let Ok(entries) = fs::read_dir(dir) {
    for entry in entries.flatten() {
      let name = entry.file_name().to_string_lossy().into_owned();
      if name.ends_with(".aux") && entry.path().is_file() {
        names.insert(name);
      }
    }
  }
  names
}

fn copy_file(from: &Path, to: &Path) -> Result<(), StoreError> {
  fs::copy(from, to).map(|_| ()).map_err(|source| StoreError::Copy {
    from: from.to_path_buf(),
    to: to.to_path_buf(),
    source,
  })
}

fn remove_dir_if_exists(path: &Path) -> Result<(), StoreError> {
  match fs::remove_dir_all(path) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(source) => Err(StoreError::Write {
      path: path.to_path_buf(),
      source,
    }),
  }
}
