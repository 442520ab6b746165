use tracing::{debug, warn};

use crate::store::{ArtifactStore, BuildRecord, ProjectKey};

use super::{BuildJob, BuildOutcome, PassReport};

pub const NO_ARTIFACT_ERROR: &str = "No artifact generated.";

/// Turn a finished job into its outcome.
///
/// A readable, non-empty artifact means success regardless of the last exit
/// status. On success the artifact, sync-map and intermediates are persisted
/// for `key`; a persistence failure only clears `has_sync_map`. The scratch
/// directory is removed before returning on every path.
pub fn assemble(job: BuildJob, report: &PassReport, store: &ArtifactStore, key: &ProjectKey) -> BuildOutcome {
  let artifact_path = job.artifact_path();
  let artifact = match std::fs::read(&artifact_path) {
    Ok(bytes) if !bytes.is_empty() => bytes,
    Ok(_) => {
      debug!(path = %artifact_path.display(), "artifact is empty");
      job.finish();
      return BuildOutcome::failed(NO_ARTIFACT_ERROR, report.last_exit);
    }
    Err(e) => {
      debug!(path = %artifact_path.display(), error = %e, "artifact not readable");
      job.finish();
      return BuildOutcome::failed(NO_ARTIFACT_ERROR, report.last_exit);
    }
  };

  let request = job.request();
  let record = BuildRecord::new(&request.project_root, &request.main_file, job.stem(), job.engine());
  let has_sync_map = match store.persist(key, record, job.outdir()) {
    Ok(persisted) => persisted.sync_map_path().is_some(),
    Err(e) => {
      warn!(key = %key, error = %e, "failed to persist build artifacts");
      false
    }
  };

  job.finish();
  BuildOutcome::succeeded(artifact, report.last_exit, has_sync_map)
}
