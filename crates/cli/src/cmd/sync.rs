//! Implementation of the `quire sync` commands.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Subcommand;

use quire_lib::config::BuildConfig;
use quire_lib::sync::{SyncBridge, SyncHit, SyncQuery, SyncResponse};

use crate::output::{HIT_MARKER, OutputFormat, Status, print_json, status};
use crate::resolve_root;

#[derive(Subcommand)]
pub enum SyncCommand {
  /// Find where a source line was rendered
  Forward {
    /// Source file, relative to the project root
    file: String,

    /// Line number (1-based)
    line: u32,

    /// Project root directory
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Find the source line behind a point on a page
  Inverse {
    /// Page number (1-based)
    page: u32,

    /// Horizontal offset in big points from the left edge
    x: f64,

    /// Vertical offset in big points from the top edge
    y: f64,

    /// Project root directory
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

pub fn cmd_sync(command: SyncCommand, config: &BuildConfig) -> Result<()> {
  let (query, root, output) = match command {
    SyncCommand::Forward {
      file,
      line,
      root,
      output,
    } => (SyncQuery::Forward { file, line }, root, output),
    SyncCommand::Inverse {
      page,
      x,
      y,
      root,
      output,
    } => (SyncQuery::Inverse { page, x, y }, root, output),
  };
  let root = resolve_root(&root)?;

  let bridge = SyncBridge::new(config);
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let response = rt.block_on(bridge.query(&root, &query));

  if output.is_json() {
    print_json(&response)?;
  } else {
    print_response(&response);
  }

  if !response.ok {
    bail!("Sync query failed");
  }
  Ok(())
}

fn print_response(response: &SyncResponse) {
  if let Some(error) = &response.error {
    status(Status::Failed, error);
    return;
  }
  if response.results.is_empty() {
    status(Status::Note, "No matching positions");
    return;
  }

  for hit in &response.results {
    match hit {
      SyncHit::Render(pos) => println!(
        "  {} page {} at ({:.2}, {:.2}) size {:.2}x{:.2}",
        HIT_MARKER,
        pos.page,
        pos.x,
        pos.y,
        pos.w,
        pos.h
      ),
      SyncHit::Source(pos) if pos.column >= 0 => {
        println!("  {} {}:{}:{}", HIT_MARKER, pos.file, pos.line, pos.column)
      }
      SyncHit::Source(pos) => println!("  {} {}:{}", HIT_MARKER, pos.file, pos.line),
    }
  }
}
