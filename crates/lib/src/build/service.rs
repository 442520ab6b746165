//! Build entry points.
//!
//! [`BuildService::build`] and [`BuildService::build_streaming`] run the same
//! job pipeline; they differ only in the [`LogSink`] they hand it.

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::config::BuildConfig;
use crate::log::{LogBuffer, LogSink};
use crate::project_lock::ProjectLock;
use crate::store::{ArtifactStore, ProjectKey};

use super::request::confine_main_file;
use super::{BuildError, BuildEvent, BuildJob, BuildOutcome, BuildRequest, BuildResult, assemble, orchestrate};

#[derive(Debug, Clone)]
pub struct BuildService {
  config: BuildConfig,
  store: ArtifactStore,
}

impl BuildService {
  pub fn new(config: BuildConfig) -> Self {
    let store = ArtifactStore::new(config.store_dir.clone());
    Self { config, store }
  }

  pub fn config(&self) -> &BuildConfig {
    &self.config
  }

  pub fn store(&self) -> &ArtifactStore {
    &self.store
  }

  /// Build and return the result with the whole captured log.
  pub async fn build(&self, request: &BuildRequest) -> BuildResult {
    let mut log = LogBuffer::new(self.config.log_cap);
    let outcome = self.execute(request, &mut log).await;
    outcome.into_result(log.into_string())
  }

  /// Build while forwarding log output to `events` as it arrives.
  ///
  /// Sends [`BuildEvent::Log`] chunks followed by exactly one
  /// [`BuildEvent::Done`] carrying the returned result. A closed receiver
  /// does not interrupt the build.
  pub async fn build_streaming(&self, request: &BuildRequest, events: UnboundedSender<BuildEvent>) -> BuildResult {
    let mut sink = StreamingSink::new(self.config.log_cap, events);
    let outcome = self.execute(request, &mut sink).await;
    let (log, events) = sink.finish();

    let result = outcome.into_result(log);
    let _ = events.send(BuildEvent::Done(result.clone()));
    result
  }

  async fn execute(&self, request: &BuildRequest, sink: &mut dyn LogSink) -> BuildOutcome {
    match self.run_job(request, sink).await {
      Ok(outcome) => outcome,
      Err(e) => {
        warn!(
          root = %request.project_root.display(),
          main = %request.main_file.display(),
          error = %e,
          "build failed"
        );
        sink.note(&e.to_string());
        BuildOutcome::rejected(&e)
      }
    }
  }

  async fn run_job(&self, request: &BuildRequest, sink: &mut dyn LogSink) -> Result<BuildOutcome, BuildError> {
    let spec = self
      .config
      .engines
      .get(&request.engine)
      .cloned()
      .ok_or_else(|| BuildError::UnsupportedEngine(request.engine.clone()))?;

    // requests may arrive deserialized, bypassing BuildRequest::new
    let request = BuildRequest {
      main_file: confine_main_file(&request.main_file)?,
      ..request.clone()
    };
    if !request.main_path().is_file() {
      return Err(BuildError::MainFileMissing(request.main_file));
    }

    let key = ProjectKey::for_root(&request.project_root);
    let lock = ProjectLock::acquire(self.store.lock_path(&key), &request.project_root, self.config.lock_wait()).await?;
    debug!(lock = %lock.lock_path().display(), "project lock acquired");

    info!(
      root = %request.project_root.display(),
      main = %request.main_file.display(),
      engine = %request.engine,
      class = %spec.class,
      clean = request.clean,
      "starting build"
    );

    let mut job = BuildJob::create(request, &spec, &self.config)?;
    if job.request().clean {
      self.store.clear_intermediates(&key, job.stem());
    } else {
      self.store.seed_intermediates(&key, job.stem(), job.outdir());
    }

    let report = orchestrate::run_passes(&mut job, &self.config, sink).await?;
    let outcome = assemble::assemble(job, &report, &self.store, &key);

    info!(
      ok = outcome.artifact.is_some(),
      passes = report.passes,
      exit_status = outcome.exit_status,
      has_sync_map = outcome.has_sync_map,
      "build finished"
    );
    Ok(outcome)
  }
}

/// Sink that keeps the capped log and forwards what it keeps.
///
/// Only bytes the buffer accepted are forwarded, so the concatenated
/// `Log` chunks equal the final log. A UTF-8 sequence split across reads is
/// held back until it completes.
struct StreamingSink {
  log: LogBuffer,
  pending: Vec<u8>,
  events: UnboundedSender<BuildEvent>,
}

impl StreamingSink {
  fn new(cap: usize, events: UnboundedSender<BuildEvent>) -> Self {
    Self {
      log: LogBuffer::new(cap),
      pending: Vec::new(),
      events,
    }
  }

  fn forward(&mut self, bytes: &[u8]) {
    self.pending.extend_from_slice(bytes);
    let complete = complete_prefix_len(&self.pending);
    if complete == 0 {
      return;
    }
    let chunk = String::from_utf8_lossy(&self.pending[..complete]).into_owned();
    self.pending.drain(..complete);
    let _ = self.events.send(BuildEvent::Log { chunk });
  }

  /// Flush held-back bytes and return the log and the channel.
  fn finish(mut self) -> (String, UnboundedSender<BuildEvent>) {
    if !self.pending.is_empty() {
      let chunk = String::from_utf8_lossy(&self.pending).into_owned();
      let _ = self.events.send(BuildEvent::Log { chunk });
    }
    (self.log.into_string(), self.events)
  }
}

impl LogSink for StreamingSink {
  fn push(&mut self, chunk: &[u8]) {
    let accepted = self.log.append(chunk);
    if accepted > 0 {
      self.forward(&chunk[..accepted]);
    }
  }
}

/// Length of the longest prefix that does not end inside an incomplete
/// UTF-8 sequence. Invalid sequences count as complete.
fn complete_prefix_len(bytes: &[u8]) -> usize {
  let mut start = 0;
  loop {
    match std::str::from_utf8(&bytes[start..]) {
      Ok(_) => return bytes.len(),
      Err(e) => match e.error_len() {
        Some(len) => start += e.valid_up_to() + len,
        None => return start + e.valid_up_to(),
      },
    }
  }
}
