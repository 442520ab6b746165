//! Implementation of the `quire status` command.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use quire_lib::config::BuildConfig;
use quire_lib::store::{ArtifactStore, BuildRecord, ProjectKey};

use crate::output::{OutputFormat, Status, field, format_built_at, format_size, print_json, status, yes_no};
use crate::resolve_root;

#[derive(Serialize)]
struct StatusReport {
  project_key: String,
  slot_dir: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  build: Option<BuildRecord>,
  artifact_bytes: Option<u64>,
  has_sync_map: bool,
}

pub fn cmd_status(root: &Path, config: &BuildConfig, output: OutputFormat) -> Result<()> {
  let root = resolve_root(root)?;
  let store = ArtifactStore::new(config.store_dir.clone());
  let key = ProjectKey::for_root(&root);

  let persisted = store.load(&key).context("Failed to read build record")?;
  let artifact_bytes = persisted
    .as_ref()
    .and_then(|p| std::fs::metadata(p.artifact_path()).ok())
    .map(|m| m.len());
  let has_sync_map = persisted.as_ref().is_some_and(|p| p.sync_map_path().is_some());

  let report = StatusReport {
    project_key: key.to_string(),
    slot_dir: store.slot_dir(&key).display().to_string(),
    build: persisted.map(|p| p.record),
    artifact_bytes,
    has_sync_map,
  };

  if output.is_json() {
    return print_json(&report);
  }

  let Some(record) = &report.build else {
    status(Status::Note, format!("No build recorded for {}", root.display()));
    return Ok(());
  };

  status(Status::Done, format!("Last build of {}", root.display()));
  field("Project key", &report.project_key);
  field("Main file", record.main_file.display());
  field("Engine", &record.engine);
  field("Built at", format_built_at(record.created_at_unix));
  field(
    "Artifact",
    report.artifact_bytes.map(format_size).unwrap_or_else(|| "missing".to_string()),
  );
  field("Sync map", yes_no(report.has_sync_map));
  field("Slot", &report.slot_dir);
  Ok(())
}
