//! External process execution.
//!
//! Runs a single tool (engine pass, bibliography tool, SyncTeX query) with
//! piped output and a hard deadline. Output is forwarded to a [`LogSink`] as
//! it is read; nothing is buffered here.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::consts::{NO_EXIT_CODE, TIMEOUT_EXIT_CODE};
use crate::log::LogSink;

const READ_CHUNK: usize = 8192;

/// How long output is still collected after the tool itself has exited.
pub const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Errors that prevent a process from running to an exit status.
///
/// A nonzero exit or a timeout is not an error; both resolve to an exit code.
#[derive(Debug, Error)]
pub enum ProcessError {
  /// The executable could not be found or is not executable.
  #[error("{program} not available: {source}")]
  ToolUnavailable {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to spawn {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to wait for {program}: {source}")]
  Wait {
    program: String,
    #[source]
    source: io::Error,
  },
}

impl ProcessError {
  pub fn is_tool_unavailable(&self) -> bool {
    matches!(self, ProcessError::ToolUnavailable { .. })
  }
}

/// A fully resolved command line.
#[derive(Debug, Clone)]
pub struct Invocation {
  pub program: String,
  pub args: Vec<String>,
  pub cwd: PathBuf,
  /// Variables layered over the ambient environment.
  pub env: BTreeMap<String, String>,
  pub timeout: Duration,
}

impl Invocation {
  pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>, timeout: Duration) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      cwd: cwd.into(),
      env: BTreeMap::new(),
      timeout,
    }
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }
}

/// Run a process to completion or until its timeout fires.
///
/// Stdout and stderr chunks are pushed into `sink` in the order they are
/// read. Returns the exit code, [`TIMEOUT_EXIT_CODE`] if the deadline hit
/// first, or [`NO_EXIT_CODE`] if the child ended without a code.
///
/// On unix the tool runs in its own process group. A timeout kills the whole
/// group, and so does a normal exit that leaves helpers holding the pipes
/// past [`DRAIN_GRACE`].
pub async fn run(invocation: &Invocation, sink: &mut dyn LogSink) -> Result<i32, ProcessError> {
  let program = invocation.program.as_str();
  info!(program = %program, args = ?invocation.args, "spawning process");

  if !invocation.cwd.is_dir() {
    return Err(ProcessError::Spawn {
      program: program.to_string(),
      source: io::Error::new(
        io::ErrorKind::NotFound,
        format!("working directory {} does not exist", invocation.cwd.display()),
      ),
    });
  }

  let mut command = Command::new(program);
  command
    .args(&invocation.args)
    .current_dir(&invocation.cwd)
    .envs(&invocation.env)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
  #[cfg(unix)]
  command.process_group(0);

  let mut child = command.spawn().map_err(|source| spawn_error(program, source))?;
  let group = child.id();

  let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
    return Err(ProcessError::Spawn {
      program: program.to_string(),
      source: io::Error::other("stdio pipes were not captured"),
    });
  };

  let deadline = tokio::time::sleep(invocation.timeout);
  tokio::pin!(deadline);

  let mut out_buf = [0u8; READ_CHUNK];
  let mut err_buf = [0u8; READ_CHUNK];
  let mut out_open = true;
  let mut err_open = true;

  let code = loop {
    tokio::select! {
      read = stdout.read(&mut out_buf), if out_open => match read {
        Ok(0) | Err(_) => out_open = false,
        Ok(n) => sink.push(&out_buf[..n]),
      },
      read = stderr.read(&mut err_buf), if err_open => match read {
        Ok(0) | Err(_) => err_open = false,
        Ok(n) => sink.push(&err_buf[..n]),
      },
      status = child.wait() => {
        let status = status.map_err(|source| ProcessError::Wait {
          program: program.to_string(),
          source,
        })?;
        break status.code().unwrap_or(NO_EXIT_CODE);
      }
      _ = &mut deadline => {
        warn!(program = %program, timeout = ?invocation.timeout, "process timed out, killing");
        kill_group(group, program);
        if let Err(e) = child.kill().await {
          warn!(program = %program, error = %e, "failed to kill timed out process");
        }
        return Ok(TIMEOUT_EXIT_CODE);
      }
    }
  };

  // output still buffered in the pipes, or written by helpers that outlive
  // the tool
  let grace = tokio::time::sleep(DRAIN_GRACE);
  tokio::pin!(grace);
  while out_open || err_open {
    tokio::select! {
      read = stdout.read(&mut out_buf), if out_open => match read {
        Ok(0) | Err(_) => out_open = false,
        Ok(n) => sink.push(&out_buf[..n]),
      },
      read = stderr.read(&mut err_buf), if err_open => match read {
        Ok(0) | Err(_) => err_open = false,
        Ok(n) => sink.push(&err_buf[..n]),
      },
      _ = &mut grace => {
        debug!(program = %program, "pipes still open after exit, killing leftover processes");
        kill_group(group, program);
        break;
      }
    }
  }

  debug!(program = %program, code, "process exited");
  Ok(code)
}

/// Send SIGKILL to the process group led by `leader`.
#[cfg(unix)]
fn kill_group(leader: Option<u32>, program: &str) {
  use rustix::process::{Pid, Signal, kill_process_group};

  let Some(pid) = leader.and_then(|id| i32::try_from(id).ok()).and_then(Pid::from_raw) else {
    return;
  };
  if let Err(e) = kill_process_group(pid, Signal::KILL)
    && e != rustix::io::Errno::SRCH
  {
    warn!(program = %program, error = %e, "failed to kill process group");
  }
}

#[cfg(not(unix))]
fn kill_group(_leader: Option<u32>, _program: &str) {}

fn spawn_error(program: &str, source: io::Error) -> ProcessError {
  match source.kind() {
    io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => ProcessError::ToolUnavailable {
      program: program.to_string(),
      source,
    },
    _ => ProcessError::Spawn {
      program: program.to_string(),
      source,
    },
  }
}
