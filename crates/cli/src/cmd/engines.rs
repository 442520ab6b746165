//! Implementation of the `quire engines` command.

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};

use quire_lib::config::BuildConfig;

use crate::output::{OutputFormat, Status, print_json, status};

pub fn cmd_engines(config: &BuildConfig, output: OutputFormat) -> Result<()> {
  if output.is_json() {
    return print_json(&config.engines);
  }

  if config.engines.is_empty() {
    status(Status::Note, "No engines configured");
    return Ok(());
  }

  let width = config.engines.names().map(str::len).max().unwrap_or(0);
  for (name, spec) in config.engines.iter() {
    let command = std::iter::once(spec.tool.program.as_str())
      .chain(spec.tool.args.iter().map(String::as_str))
      .collect::<Vec<_>>()
      .join(" ");
    println!(
      "{:<width$}  {:<15}  {}",
      name.if_supports_color(Stream::Stdout, |s| s.bold()),
      spec.class.as_str(),
      command.if_supports_color(Stream::Stdout, |s| s.dimmed()),
      width = width
    );
  }
  Ok(())
}
