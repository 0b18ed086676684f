//! Error types for the `reftrack` command line tool.

use thiserror::Error;

use super::*;

/// Errors surfaced by CLI commands.
#[derive(Error, Debug)]
pub enum ReftrackdError {
  /// Anything the library reports.
  #[error(transparent)]
  Reftrack(#[from] ReftrackError),

  /// A prompt could not be shown or answered.
  #[error(transparent)]
  Interaction(#[from] dialoguer::Error),

  /// Reading or writing a local file failed.
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// Output could not be serialized.
  #[error(transparent)]
  Json(#[from] serde_json::Error),

  /// The command line asked for something that can't be done.
  #[error("{0}")]
  Usage(String),
}

/// Result alias for CLI commands.
pub type Result<T> = core::result::Result<T, ReftrackdError>;
