use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::NO_EXIT_CODE;
use crate::process::ProcessError;
use crate::project_lock::ProjectLockError;

/// Errors that end a build before it produces an artifact.
///
/// None of these escape [`BuildService`](super::BuildService); they are
/// folded into a failed [`BuildResult`].
#[derive(Debug, Error)]
pub enum BuildError {
  #[error("unsupported engine: {0}")]
  UnsupportedEngine(String),

  #[error("main file not found: {}", .0.display())]
  MainFileMissing(PathBuf),

  #[error("main file must be a relative path inside the project: {}", .0.display())]
  MainFileOutsideProject(PathBuf),

  /// The engine binary could not be started.
  #[error("{0} not available")]
  ToolUnavailable(String),

  #[error("engine process failed: {0}")]
  Process(#[source] ProcessError),

  #[error("failed to create scratch directory: {0}")]
  Scratch(#[source] io::Error),

  #[error("build already in progress for this project: {0}")]
  Busy(#[from] ProjectLockError),
}

/// Final outcome of one build job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildResult {
  pub ok: bool,

  /// The rendered artifact; present only when `ok`.
  #[serde(default, skip_serializing_if = "Option::is_none", with = "artifact_base64")]
  pub artifact: Option<Vec<u8>>,

  /// Captured output of every pass, truncated at the log cap.
  pub log: String,

  /// Exit status of the last engine pass (`-9` when it was killed by the
  /// timeout, `-1` when no pass ran).
  pub exit_status: i32,

  /// Whether a sync-map was persisted for SyncTeX queries.
  pub has_sync_map: bool,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

/// A build result before the log is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutcome {
  pub artifact: Option<Vec<u8>>,
  pub exit_status: i32,
  pub has_sync_map: bool,
  pub error: Option<String>,
}

impl BuildOutcome {
  pub fn succeeded(artifact: Vec<u8>, exit_status: i32, has_sync_map: bool) -> Self {
    Self {
      artifact: Some(artifact),
      exit_status,
      has_sync_map,
      error: None,
    }
  }

  pub fn failed(error: impl ToString, exit_status: i32) -> Self {
    Self {
      artifact: None,
      exit_status,
      has_sync_map: false,
      error: Some(error.to_string()),
    }
  }

  /// Failure detected before any pass ran.
  pub fn rejected(error: &BuildError) -> Self {
    Self::failed(error, NO_EXIT_CODE)
  }

  pub fn into_result(self, log: String) -> BuildResult {
    BuildResult {
      ok: self.artifact.is_some(),
      artifact: self.artifact,
      log,
      exit_status: self.exit_status,
      has_sync_map: self.has_sync_map,
      error: self.error,
    }
  }
}

/// Events emitted by a streaming build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum BuildEvent {
  /// A piece of log output, in arrival order.
  Log { chunk: String },
  /// The terminal event; carries the same result the synchronous build returns.
  Done(BuildResult),
}

mod artifact_base64 {
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD;
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
      Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
      None => serializer.serialize_none(),
    }
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
    let encoded: Option<String> = Option::deserialize(deserializer)?;
    encoded
      .map(|e| STANDARD.decode(e).map_err(serde::de::Error::custom))
      .transpose()
  }
}
