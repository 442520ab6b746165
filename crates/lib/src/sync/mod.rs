//! SyncTeX queries against persisted builds.
//!
//! Forward queries map a source line to boxes in the rendered artifact;
//! inverse queries map a point on a page back to a source line. Both run the
//! `synctex` utility against the artifact and sync-map the last successful
//! build persisted for the project.

pub mod parse;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::BuildConfig;
use crate::consts::TIMEOUT_EXIT_CODE;
use crate::engine::ToolSpec;
use crate::log::LogBuffer;
use crate::process::{self, Invocation};
use crate::store::{ArtifactStore, ProjectKey, StoreError};

/// Upper bound on captured `synctex` output.
const QUERY_OUTPUT_CAP: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum SyncQuery {
  /// Source line to rendered positions.
  Forward { file: String, line: u32 },
  /// Page coordinates to source positions.
  Inverse { page: u32, x: f64, y: f64 },
}

/// A box on a rendered page, in big points from the top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPosition {
  pub page: u32,
  pub x: f64,
  pub y: f64,
  pub w: f64,
  pub h: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePosition {
  /// Path relative to the project root when the file lives inside it.
  pub file: String,
  pub line: u32,
  pub column: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyncHit {
  Render(RenderPosition),
  Source(SourcePosition),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
  pub ok: bool,
  pub results: Vec<SyncHit>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl SyncResponse {
  fn failed(error: &SyncError) -> Self {
    Self {
      ok: false,
      results: Vec::new(),
      error: Some(error.to_string()),
    }
  }
}

#[derive(Debug, Error)]
pub enum SyncError {
  #[error("No sync data available, recompile first.")]
  NoSyncData,

  #[error("{0} not available")]
  ToolUnavailable(String),

  #[error("sync query failed: {0}")]
  Failed(String),

  #[error("sync query timed out after {0:?}")]
  TimedOut(Duration),

  #[error("failed to read build record: {0}")]
  Store(#[from] StoreError),
}

/// Runs SyncTeX queries for any project in the store.
#[derive(Debug, Clone)]
pub struct SyncBridge {
  tool: ToolSpec,
  timeout: Duration,
  store: ArtifactStore,
}

impl SyncBridge {
  pub fn new(config: &BuildConfig) -> Self {
    Self {
      tool: config.synctex.clone(),
      timeout: config.sync_timeout(),
      store: ArtifactStore::new(config.store_dir.clone()),
    }
  }

  /// Answer `query` for the project at `root`. Failures are reported in the
  /// response, never returned.
  pub async fn query(&self, root: &Path, query: &SyncQuery) -> SyncResponse {
    match self.run_query(root, query).await {
      Ok(results) => SyncResponse {
        ok: true,
        results,
        error: None,
      },
      Err(e) => {
        warn!(root = %root.display(), error = %e, "sync query failed");
        SyncResponse::failed(&e)
      }
    }
  }

  async fn run_query(&self, root: &Path, query: &SyncQuery) -> Result<Vec<SyncHit>, SyncError> {
    let key = ProjectKey::for_root(root);
    let persisted = self.store.load(&key)?.ok_or(SyncError::NoSyncData)?;
    if persisted.sync_map_path().is_none() {
      return Err(SyncError::NoSyncData);
    }
    let artifact = persisted.artifact_path();

    let invocation = Invocation::new(&self.tool.program, root, self.timeout)
      .args(self.tool.args.iter().cloned())
      .args(query_args(query, &artifact));
    let mut output = LogBuffer::new(QUERY_OUTPUT_CAP);

    let code = process::run(&invocation, &mut output).await.map_err(|e| {
      if e.is_tool_unavailable() {
        SyncError::ToolUnavailable(self.tool.program.clone())
      } else {
        SyncError::Failed(e.to_string())
      }
    })?;
    if code == TIMEOUT_EXIT_CODE {
      return Err(SyncError::TimedOut(self.timeout));
    }
    if code != 0 {
      return Err(SyncError::Failed(format!("{} exited with status {}", self.tool.program, code)));
    }

    let records = parse::parse_records(&output.into_string());
    let hits: Vec<SyncHit> = match query {
      SyncQuery::Forward { .. } => parse::forward_hits(&records).into_iter().map(SyncHit::Render).collect(),
      SyncQuery::Inverse { .. } => parse::inverse_hits(&records, root)
        .into_iter()
        .map(SyncHit::Source)
        .collect(),
    };
    debug!(records = records.len(), hits = hits.len(), "sync query answered");
    Ok(hits)
  }
}

fn query_args(query: &SyncQuery, artifact: &Path) -> Vec<String> {
  let artifact = artifact.to_string_lossy();
  match query {
    SyncQuery::Forward { file, line } => vec![
      "view".to_string(),
      "-i".to_string(),
      format!("{}:0:{}", line, file),
      "-o".to_string(),
      artifact.into_owned(),
    ],
    SyncQuery::Inverse { page, x, y } => vec![
      "edit".to_string(),
      "-o".to_string(),
      format!("{}:{}:{}:{}", page, x, y, artifact),
    ],
  }
}
