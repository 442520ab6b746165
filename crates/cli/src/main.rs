mod cmd;
mod output;
mod prompts;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quire_lib::build::DEFAULT_ENGINE;
use quire_lib::config::BuildConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cmd::{BuildOptions, SyncCommand, cmd_build, cmd_clean, cmd_engines, cmd_status, cmd_sync};
use output::OutputFormat;

/// quire - build LaTeX projects and query SyncTeX positions
#[derive(Parser)]
#[command(name = "quire")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// JSON configuration file
  #[arg(long, global = true, value_name = "FILE")]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build a document
  Build {
    /// Main file, relative to the project root
    main: PathBuf,

    /// Project root directory
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Engine name from the engine table
    #[arg(short, long, default_value = DEFAULT_ENGINE)]
    engine: String,

    /// Ignore intermediates from previous builds
    #[arg(long)]
    clean: bool,

    /// Per-pass timeout (e.g., "90s", "5m")
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Print log output while the build runs
    #[arg(long)]
    stream: bool,

    /// Write the artifact to this path
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Map between source lines and rendered positions
  #[command(subcommand)]
  Sync(SyncCommand),

  /// List configured engines
  Engines {
    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show the last successful build of a project
  Status {
    /// Project root directory
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Remove the persisted build of a project
  Clean {
    /// Project root directory
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Skip confirmation prompt
    #[arg(long)]
    force: bool,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let config = load_config(cli.config.as_deref())?;

  match cli.command {
    Commands::Build {
      main,
      root,
      engine,
      clean,
      timeout,
      stream,
      out,
      output,
    } => cmd_build(
      BuildOptions {
        main,
        root,
        engine,
        clean,
        timeout,
        stream,
        out,
        output,
        verbose: cli.verbose,
      },
      config,
    ),
    Commands::Sync(command) => cmd_sync(command, &config),
    Commands::Engines { output } => cmd_engines(&config, output),
    Commands::Status { root, output } => cmd_status(&root, &config, output),
    Commands::Clean { root, force } => cmd_clean(&root, &config, force),
  }
}

fn init_tracing(verbose: bool) {
  let default_level = if verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn load_config(path: Option<&Path>) -> Result<BuildConfig> {
  let config = match path {
    Some(path) => BuildConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))?,
    None => BuildConfig::default(),
  };
  let config = config.with_env_overrides()?;
  debug!(store = %config.store_dir.display(), scratch = %config.scratch_dir.display(), "configuration loaded");
  Ok(config)
}

/// Canonical project root; builds and queries key the store on it.
pub fn resolve_root(root: &Path) -> Result<PathBuf> {
  dunce::canonicalize(root).with_context(|| format!("Project root not found: {}", root.display()))
}
