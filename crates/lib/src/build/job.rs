use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::config::BuildConfig;
use crate::engine::{EngineClass, EngineSpec, TemplateVars};
use crate::process::Invocation;

use super::{BuildError, BuildRequest};

/// One build in flight.
///
/// Owns the scratch output directory; dropping the job removes it.
#[derive(Debug)]
pub struct BuildJob {
  request: BuildRequest,
  scratch: TempDir,
  stem: String,
  class: EngineClass,
  program: String,
  args: Vec<String>,
  pass_timeout: Duration,
  passes: u32,
}

impl BuildJob {
  /// Create the scratch directory and resolve the engine command line.
  pub fn create(request: BuildRequest, spec: &EngineSpec, config: &BuildConfig) -> Result<Self, BuildError> {
    let stem = request.stem()?;

    std::fs::create_dir_all(&config.scratch_dir).map_err(BuildError::Scratch)?;
    let scratch = tempfile::Builder::new()
      .prefix("build-")
      .tempdir_in(&config.scratch_dir)
      .map_err(BuildError::Scratch)?;

    let vars = TemplateVars::new(scratch.path(), &request.main_file, &stem, &request.project_root);
    let args = spec.tool.render_args(&vars);
    debug!(scratch = %scratch.path().display(), program = %spec.tool.program, "created build job");

    Ok(Self {
      request,
      scratch,
      stem,
      class: spec.class,
      program: spec.tool.program.clone(),
      args,
      pass_timeout: config.pass_timeout(),
      passes: 0,
    })
  }

  pub fn request(&self) -> &BuildRequest {
    &self.request
  }

  pub fn engine(&self) -> &str {
    &self.request.engine
  }

  pub fn class(&self) -> EngineClass {
    self.class
  }

  pub fn stem(&self) -> &str {
    &self.stem
  }

  pub fn outdir(&self) -> &Path {
    self.scratch.path()
  }

  pub fn project_root(&self) -> &Path {
    &self.request.project_root
  }

  pub fn pass_timeout(&self) -> Duration {
    self.pass_timeout
  }

  /// Number of engine passes started so far.
  pub fn passes(&self) -> u32 {
    self.passes
  }

  pub fn template_vars(&self) -> TemplateVars {
    TemplateVars::new(
      self.outdir(),
      &self.request.main_file,
      &self.stem,
      &self.request.project_root,
    )
  }

  /// Count a new pass and return its engine invocation.
  pub fn next_pass(&mut self) -> (u32, Invocation) {
    self.passes += 1;
    let invocation =
      Invocation::new(&self.program, &self.request.project_root, self.pass_timeout).args(self.args.iter().cloned());
    (self.passes, invocation)
  }

  pub fn scratch_file(&self, suffix: &str) -> PathBuf {
    self.outdir().join(format!("{}.{}", self.stem, suffix))
  }

  pub fn aux_path(&self) -> PathBuf {
    self.scratch_file("aux")
  }

  /// Resolved bibliography written by bibtex or biber.
  pub fn bbl_path(&self) -> PathBuf {
    self.scratch_file("bbl")
  }

  pub fn artifact_path(&self) -> PathBuf {
    self.scratch_file("pdf")
  }

  /// Remove the scratch directory, logging instead of failing.
  pub fn finish(self) {
    let path = self.scratch.path().to_path_buf();
    if let Err(e) = self.scratch.close() {
      warn!(path = %path.display(), error = %e, "failed to remove scratch directory");
    }
  }
}
