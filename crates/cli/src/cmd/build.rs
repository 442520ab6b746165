//! Implementation of the `quire build` command.

use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;
use tracing::info;

use quire_lib::build::{BuildEvent, BuildRequest, BuildResult, BuildService};
use quire_lib::config::BuildConfig;

use crate::output::{
  OutputFormat, Status, field, format_elapsed, format_exit_status, format_size, print_json, status, yes_no,
};
use crate::resolve_root;

pub struct BuildOptions {
  pub main: PathBuf,
  pub root: PathBuf,
  pub engine: String,
  pub clean: bool,
  pub timeout: Option<Duration>,
  pub stream: bool,
  pub out: Option<PathBuf>,
  pub output: OutputFormat,
  pub verbose: bool,
}

/// Build one document and report the result.
///
/// Exits with an error when the build produced no artifact.
pub fn cmd_build(options: BuildOptions, mut config: BuildConfig) -> Result<()> {
  let root = resolve_root(&options.root)?;
  if let Some(timeout) = options.timeout {
    config.pass_timeout_secs = whole_seconds(timeout)?;
  }

  let request = BuildRequest::new(&root, &options.main, options.engine.as_str())
    .context("Invalid main file")?
    .with_clean(options.clean);
  let service = BuildService::new(config);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let start = Instant::now();
  let result = if options.stream {
    rt.block_on(build_streaming(&service, &request, options.output))
  } else {
    rt.block_on(service.build(&request))
  };
  let elapsed = start.elapsed();
  info!(ok = result.ok, elapsed = ?elapsed, "build command finished");

  if let (Some(out), Some(artifact)) = (&options.out, &result.artifact) {
    std::fs::write(out, artifact).with_context(|| format!("Failed to write artifact to {}", out.display()))?;
  }

  match (options.output, options.stream) {
    // streamed JSON already ended with the done event
    (OutputFormat::Json, true) => {}
    (OutputFormat::Json, false) => print_json(&result)?,
    (OutputFormat::Text, streamed) => print_summary(&request, &result, &options, elapsed, streamed),
  }

  if !result.ok {
    bail!("Build failed");
  }
  Ok(())
}

/// Pass timeouts are configured in whole seconds.
fn whole_seconds(timeout: Duration) -> Result<u64> {
  if timeout.subsec_nanos() != 0 || timeout.as_secs() == 0 {
    bail!(
      "--timeout must be a whole number of seconds, at least 1s (got {})",
      humantime::format_duration(timeout)
    );
  }
  Ok(timeout.as_secs())
}

async fn build_streaming(service: &BuildService, request: &BuildRequest, output: OutputFormat) -> BuildResult {
  let (tx, mut rx) = mpsc::unbounded_channel();

  let printer = async move {
    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
      match (&event, output) {
        (_, OutputFormat::Json) => {
          if let Ok(line) = serde_json::to_string(&event) {
            let _ = writeln!(stdout, "{}", line);
          }
        }
        (BuildEvent::Log { chunk }, OutputFormat::Text) => {
          let _ = stdout.write_all(chunk.as_bytes());
        }
        (BuildEvent::Done(_), OutputFormat::Text) => {}
      }
      let _ = stdout.flush();
    }
  };

  let (result, ()) = tokio::join!(service.build_streaming(request, tx), printer);
  result
}

fn print_summary(request: &BuildRequest, result: &BuildResult, options: &BuildOptions, elapsed: Duration, streamed: bool) {
  let show_log = !streamed && (options.verbose || !result.ok);
  if show_log {
    println!("{}", result.log);
  }

  println!();
  match (&result.artifact, &result.error) {
    (Some(artifact), _) => {
      status(Status::Done, format!("Built {}", request.main_file.display()));
      field("Artifact", format_size(artifact.len() as u64));
      if let Some(out) = &options.out {
        field("Written to", out.display());
      }
    }
    (None, error) => status(Status::Failed, error.as_deref().unwrap_or("Build failed")),
  }
  field("Engine", &request.engine);
  field("Exit status", format_exit_status(result.exit_status));
  field("Sync map", yes_no(result.has_sync_map));
  field("Duration", format_elapsed(elapsed));

  if result.ok && !result.has_sync_map {
    status(
      Status::Caution,
      "No sync map persisted; sync queries will not work for this build",
    );
  }
}
