//! Implementation of the `quire clean` command.

use std::path::Path;

use anyhow::{Context, Result};

use quire_lib::config::BuildConfig;
use quire_lib::project_lock::ProjectLock;
use quire_lib::store::{ArtifactStore, ProjectKey};

use crate::output::{Status, status};
use crate::prompts::confirm;
use crate::resolve_root;

/// Remove the persisted build of a project, including the intermediates
/// later builds would reuse.
pub fn cmd_clean(root: &Path, config: &BuildConfig, force: bool) -> Result<()> {
  let root = resolve_root(root)?;
  let store = ArtifactStore::new(config.store_dir.clone());
  let key = ProjectKey::for_root(&root);

  if !store.slot_dir(&key).exists() {
    status(Status::Note, format!("Nothing to clean for {}", root.display()));
    return Ok(());
  }

  if !confirm(&format!("Remove the persisted build of {}?", root.display()), force)? {
    status(Status::Note, "Aborted");
    return Ok(());
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let removed = rt.block_on(async {
    let _lock = ProjectLock::acquire(store.lock_path(&key), &root, config.lock_wait()).await?;
    anyhow::Ok(store.clear(&key)?)
  })?;

  if removed {
    status(Status::Done, format!("Removed persisted build of {}", root.display()));
  } else {
    status(Status::Note, format!("Nothing to clean for {}", root.display()));
  }
  Ok(())
}
