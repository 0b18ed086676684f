//! Command line interface for the reftrack reference curation library.
//!
//! Tracks cited URLs per section, stores them in an external reference manager in batches, and
//! finds and repairs records whose local state disagrees with the external store.
//!
//! # Usage
//!
//! ```bash
//! # One-time setup
//! reftrack init
//!
//! # Track URLs under a section
//! reftrack add introduction https://example.org/paper https://example.org/report
//!
//! # Store everything in the section, 3 at a time
//! reftrack batch --section introduction --concurrency 3
//!
//! # Find and fix integrity problems
//! reftrack check
//! reftrack repair 12
//! ```
//!
//! Logs go to stderr; raise the level with `-v` (repeatable) or `RUST_LOG`, and additionally
//! write them to daily rotated files with `--log-dir`.

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::path::{Path, PathBuf};

use clap::{builder::ArgAction, Parser};
use reftrack::{error::ReftrackError, Config, Reftrack};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Subcommands and their arguments.
pub mod commands;
/// CLI error type.
pub mod error;
/// Terminal output and prompts.
pub mod interaction;

use crate::{
  commands::*,
  error::{ReftrackdError, Result},
  interaction::*,
};

/// Command line interface configuration and argument parsing
#[derive(Parser)]
#[command(author, version, about = "Curate, store and repair tracked references")]
pub struct Cli {
  /// Verbose mode (-v, -vv, -vvv) for different levels of logging detail
  #[arg(short, long, action = ArgAction::Count, global = true)]
  verbose: u8,

  /// Configuration directory, defaults to the platform config dir
  #[arg(long, short, global = true)]
  path: Option<PathBuf>,

  /// Also write logs to daily rotated files in this directory
  #[arg(long, global = true)]
  log_dir: Option<PathBuf>,

  /// Skip all prompts and accept defaults (mainly for testing)
  #[arg(long, hide = true, global = true)]
  accept_defaults: bool,

  /// The subcommand to execute
  #[command(subcommand)]
  command: Commands,
}

/// Configures the tracing subscriber.
///
/// Verbosity maps to the same levels as `RUST_LOG`, which wins when set. The returned guard
/// flushes the file writer and must live until exit.
fn setup_logging(verbosity: u8, log_dir: Option<&Path>) -> Option<WorkerGuard> {
  let level = match verbosity {
    0 => "error",
    1 => "warn",
    2 => "info",
    3 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

  let stderr = fmt::layer()
    .with_writer(std::io::stderr)
    .with_file(true)
    .with_line_number(true)
    .with_thread_ids(true)
    .with_target(true);

  let (file, guard) = match log_dir {
    Some(dir) => {
      let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "reftrack.log"));
      (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
    },
    None => (None, None),
  };

  tracing_subscriber::registry().with(filter).with(stderr).with(file).init();
  guard
}

/// Entry point: parses arguments, sets up logging and runs the command.
#[tokio::main]
async fn main() {
  let cli = Cli::parse();
  let _guard = setup_logging(cli.verbose, cli.log_dir.as_deref());
  let interaction = Terminal::new(cli.accept_defaults);

  if let Err(e) = run(&interaction, cli).await {
    // Printing can't fail in a way worth reporting here
    let _ = interaction.reply(ResponseContent::Error(e));
    std::process::exit(1);
  }
}

/// Dispatches a parsed command line.
async fn run<I: UserInteraction>(interaction: &I, cli: Cli) -> Result<()> {
  let config_dir = cli.path.unwrap_or_else(Config::default_path);
  debug!(config_dir = %config_dir.display(), "Using configuration directory");

  if let Commands::Init(options) = cli.command {
    return init(interaction, &config_dir, options).await;
  }

  let config = Config::load(&config_dir).map_err(|e| {
    ReftrackdError::Usage(format!("{e}\nRun `reftrack init` to create a configuration"))
  })?;
  let reftrack = Reftrack::open(config).await?;

  match cli.command {
    Commands::Init(_) => Ok(()),
    Commands::Add(args) => add(interaction, &reftrack, args).await,
    Commands::List(args) => list(interaction, &reftrack, args).await,
    Commands::Show(args) => show(interaction, &reftrack, args).await,
    Commands::Check(args) => check(interaction, &reftrack, args).await,
    Commands::Repair(args) => repair(interaction, &reftrack, args).await,
    Commands::Intent(args) => intent(interaction, &reftrack, args).await,
    Commands::Unlink(args) => unlink(interaction, &reftrack, args).await,
    Commands::Delete(args) => delete(interaction, &reftrack, args).await,
    Commands::Batch(args) => batch(interaction, &reftrack, args).await,
  }
}
