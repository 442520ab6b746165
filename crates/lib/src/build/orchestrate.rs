//! The pass state machine.
//!
//! ```text
//! Start -> Pass1 -> BibDecision -> SkipBib -> Pass2Final -> Done
//!                              \-> RunBib -> Pass2 -> Pass3Final -> Done
//! ```
//!
//! Self-converging engines run a single pass and never reach `BibDecision`.
//! A failing or timed-out pass does not stop the plan; whether the build
//! succeeded is decided afterwards by looking for the artifact.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::bib::{self, BibTool};
use crate::config::BuildConfig;
use crate::consts::{NO_EXIT_CODE, TIMEOUT_EXIT_CODE};
use crate::engine::{EngineClass, ToolSpec};
use crate::log::LogSink;
use crate::process::{self, Invocation, ProcessError};

use super::{BuildError, BuildJob};

#[cfg(unix)]
const SEARCH_PATH_SEPARATOR: &str = ":";
#[cfg(windows)]
const SEARCH_PATH_SEPARATOR: &str = ";";

/// Log line written when the bibliography step is skipped.
pub const SKIP_BIBLIOGRAPHY_MARKER: &str = "citations unchanged, skipping bibliography";

/// What the orchestrator did for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
  /// Engine passes started.
  pub passes: u32,
  /// Bibliography tool invocations that ran to an exit status.
  pub bib_runs: u32,
  /// Tool chosen at the bibliography decision.
  pub bib_tool: BibTool,
  /// The fingerprint matched and the bibliography step was skipped.
  pub bib_skipped: bool,
  /// Exit status of the last engine pass.
  pub last_exit: i32,
}

impl PassReport {
  fn new() -> Self {
    Self {
      passes: 0,
      bib_runs: 0,
      bib_tool: BibTool::None,
      bib_skipped: false,
      last_exit: NO_EXIT_CODE,
    }
  }
}

/// Drive every pass of `job`, writing all output to `sink`.
///
/// Only an engine that cannot be run at all ends the plan early.
pub async fn run_passes(
  job: &mut BuildJob,
  config: &BuildConfig,
  sink: &mut dyn LogSink,
) -> Result<PassReport, BuildError> {
  let mut report = PassReport::new();

  if job.class() == EngineClass::SelfConverging {
    run_engine_pass(job, sink, &mut report).await?;
    info!(engine = %job.engine(), passes = report.passes, "self-converging build finished");
    return Ok(report);
  }

  let before = bib::fingerprint_file(&job.aux_path());
  run_engine_pass(job, sink, &mut report).await?;
  let after = bib::fingerprint_file(&job.aux_path());

  if before.matches(&after) && job.bbl_path().is_file() {
    debug!(fingerprint = %after, "citation fingerprint unchanged");
    sink.note(SKIP_BIBLIOGRAPHY_MARKER);
    report.bib_skipped = true;
    run_engine_pass(job, sink, &mut report).await?;
  } else {
    let aux = bib::read_aux_tree(&job.aux_path()).unwrap_or_default();
    let main = read_or_empty(&job.request().main_path());
    report.bib_tool = bib::select(&aux, &main);
    debug!(tool = %report.bib_tool, "selected bibliography tool");

    let spec = match report.bib_tool {
      BibTool::None => None,
      BibTool::Bibtex => Some(&config.bibtex),
      BibTool::Biber => Some(&config.biber),
    };
    if let Some(spec) = spec
      && run_bibliography(job, report.bib_tool, spec, sink).await
    {
      report.bib_runs += 1;
    }

    run_engine_pass(job, sink, &mut report).await?;
    run_engine_pass(job, sink, &mut report).await?;
  }

  info!(
    engine = %job.engine(),
    passes = report.passes,
    bib_runs = report.bib_runs,
    bib_skipped = report.bib_skipped,
    last_exit = report.last_exit,
    "multi-pass build finished"
  );
  Ok(report)
}

async fn run_engine_pass(job: &mut BuildJob, sink: &mut dyn LogSink, report: &mut PassReport) -> Result<(), BuildError> {
  let (pass, invocation) = job.next_pass();
  report.passes = pass;
  sink.note(&format!("pass {}: {}", pass, job.engine()));

  let code = process::run(&invocation, sink).await.map_err(|e| match e {
    ProcessError::ToolUnavailable { .. } => BuildError::ToolUnavailable(job.engine().to_string()),
    other => BuildError::Process(other),
  })?;

  if code == TIMEOUT_EXIT_CODE {
    sink.note(&format!("{} timed out after {}s, killed", job.engine(), invocation.timeout.as_secs()));
  }
  debug!(pass, code, "engine pass finished");
  report.last_exit = code;
  Ok(())
}

/// Run the bibliography tool from the project root. Returns whether it ran
/// to an exit status; a tool that cannot be run is only a warning.
async fn run_bibliography(job: &BuildJob, tool: BibTool, spec: &ToolSpec, sink: &mut dyn LogSink) -> bool {
  sink.note(&format!("bibliography: {}", tool));

  let invocation = bibliography_invocation(job, tool, spec);
  match process::run(&invocation, sink).await {
    Ok(code) => {
      if code == TIMEOUT_EXIT_CODE {
        sink.note(&format!("{} timed out after {}s, killed", tool, invocation.timeout.as_secs()));
      } else if code != 0 {
        warn!(tool = %tool, code, "bibliography tool exited with nonzero status");
      }
      true
    }
    Err(e) if e.is_tool_unavailable() => {
      warn!(tool = %tool, error = %e, "bibliography tool not available");
      sink.note(&format!("{} not available, continuing without bibliography", tool));
      false
    }
    Err(e) => {
      warn!(tool = %tool, error = %e, "bibliography tool failed");
      sink.note(&format!("{} failed: {}", tool, e));
      false
    }
  }
}

fn bibliography_invocation(job: &BuildJob, tool: BibTool, spec: &ToolSpec) -> Invocation {
  let root = job.project_root();
  let search_path = format!("{}{}", root.display(), SEARCH_PATH_SEPARATOR);

  let mut invocation = Invocation::new(&spec.program, root, job.pass_timeout())
    .args(spec.render_args(&job.template_vars()))
    .env("BIBINPUTS", search_path.clone())
    .env("BSTINPUTS", search_path);
  if tool == BibTool::Bibtex {
    // bibtex refuses to write outside the cwd unless told otherwise
    invocation = invocation.env("openout_any", "a");
  }
  invocation
}

fn read_or_empty(path: &Path) -> String {
  std::fs::read(path)
    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    .unwrap_or_default()
}
