//! Terminal rendering for build reports and sync hits.
//!
//! Text mode prints one marked [`Status`] headline followed by indented
//! label/value rows. `--output json` skips all of it and serializes the
//! library's result types directly.

use std::fmt::Display;
use std::time::{Duration, UNIX_EPOCH};

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream, Style};

use quire_lib::consts::{NO_EXIT_CODE, TIMEOUT_EXIT_CODE};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

/// Leads each resolved sync position.
pub const HIT_MARKER: &str = "→";

/// Kind of headline a command prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Done,
  Failed,
  Caution,
  Note,
}

impl Status {
  fn marker(self) -> &'static str {
    match self {
      Status::Done => "✓",
      Status::Failed => "✗",
      Status::Caution => "⚠",
      Status::Note => "•",
    }
  }

  fn style(self) -> Style {
    match self {
      Status::Done => Style::new().green(),
      Status::Failed => Style::new().red(),
      Status::Caution => Style::new().yellow(),
      Status::Note => Style::new().blue(),
    }
  }

  /// Failures and cautions go to stderr so piped stdout stays clean.
  fn stream(self) -> Stream {
    match self {
      Status::Failed | Status::Caution => Stream::Stderr,
      Status::Done | Status::Note => Stream::Stdout,
    }
  }
}

pub fn status(kind: Status, message: impl Display) {
  let style = kind.style();
  let marker = kind.marker();
  let marker = marker.if_supports_color(kind.stream(), |m| m.style(style));
  match kind.stream() {
    Stream::Stderr => {
      let message = message.if_supports_color(Stream::Stderr, |m| m.style(style));
      eprintln!("{} {}", marker, message)
    }
    Stream::Stdout => println!("{} {}", marker, message),
  }
}

/// Indented `label: value` row under a headline.
pub fn field(label: &str, value: impl Display) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

pub fn yes_no(flag: bool) -> &'static str {
  if flag { "yes" } else { "no" }
}

/// Artifact size in binary units.
pub fn format_size(bytes: u64) -> String {
  const UNITS: [&str; 3] = ["KiB", "MiB", "GiB"];
  if bytes < 1024 {
    return format!("{} B", bytes);
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit + 1 < UNITS.len() {
    value /= 1024.0;
    unit += 1;
  }
  format!("{:.1} {}", value, UNITS[unit])
}

/// Wall time of a build: milliseconds for quick cache hits, centiseconds
/// up to a minute, whole seconds after that.
pub fn format_elapsed(elapsed: Duration) -> String {
  match elapsed.as_secs() {
    0 => format!("{}ms", elapsed.as_millis()),
    1..60 => format!("{:.2}s", elapsed.as_secs_f64()),
    secs => humantime::format_duration(Duration::from_secs(secs)).to_string(),
  }
}

/// RFC 3339 timestamp for a record's `created_at_unix`.
pub fn format_built_at(secs: u64) -> String {
  humantime::format_rfc3339_seconds(UNIX_EPOCH + Duration::from_secs(secs)).to_string()
}

/// Exit status with the sentinel values spelled out.
pub fn format_exit_status(code: i32) -> String {
  match code {
    TIMEOUT_EXIT_CODE => format!("{} (killed by timeout)", code),
    NO_EXIT_CODE => format!("{} (no pass completed)", code),
    _ => code.to_string(),
  }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
