//! Error types for the reftrack library.
//!
//! Integrity violations found by the [`guard`](crate::guard) are not errors; they are reported
//! as [`IssueCode`](crate::guard::IssueCode) values. This module covers everything that can
//! actually go wrong:
//! - Database and filesystem failures
//! - External item store failures
//! - Repairs that cannot be applied
//! - Misuse of batch sessions (unknown ids, invalid transitions)
//!
//! # Examples
//!
//! ```no_run
//! use reftrack::{error::ReftrackError, repair::RepairOutcome};
//!
//! # async fn example(repairer: reftrack::repair::Repairer) -> Result<(), ReftrackError> {
//! match repairer.repair(42).await {
//!   Ok(RepairOutcome::NoIssueFound) => println!("Already consistent"),
//!   Ok(RepairOutcome::Repaired { plan }) => println!("Applied: {}", plan.reasoning),
//!   Err(ReftrackError::ExternalService(e)) => println!("Retry later: {e}"),
//!   Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

use crate::guard::IssueCode;

/// Error type alias used for the [`reftrack`](crate) crate.
pub type Result<T> = core::result::Result<T, ReftrackError>;

/// Errors that can occur when working with the reftrack library.
#[derive(Error, Debug)]
pub enum ReftrackError {
  /// The requested reference record doesn't exist.
  #[error("Reference record {0} not found")]
  NotFound(i64),

  /// A section with the given name or id doesn't exist.
  #[error("Section \"{0}\" not found")]
  SectionNotFound(String),

  /// Tried to add a URL that the section already tracks.
  #[error("Section {section_id} already tracks {url}")]
  DuplicateReference {
    /// Owning section.
    section_id: i64,
    /// The duplicate URL.
    url:        String,
  },

  /// A stored status string didn't match any known variant.
  ///
  /// The string parameter contains the invalid value for debugging.
  #[error("Invalid status value: {0}")]
  InvalidStatus(String),

  /// A reference URL was rejected.
  ///
  /// URLs must parse and carry both a scheme and a host.
  #[error("Invalid URL: {0}")]
  InvalidUrl(String),

  /// The external item store failed or could not be reached.
  ///
  /// This is always recoverable: the caller may retry the same operation later.
  #[error("External service error: {0}")]
  ExternalService(String),

  /// The state guard found violations but could not propose a plan for them.
  ///
  /// Surfaced to operators as requiring manual correction.
  #[error("No repair plan applies to issues {issues:?}; manual correction required")]
  NoApplicablePlan {
    /// The issues that were detected.
    issues: Vec<IssueCode>,
  },

  /// A record violates integrity invariants and must be repaired before it is processed.
  #[error("Reference record {id} violates {issues:?}; repair it first")]
  IntegrityViolation {
    /// The offending record.
    id:     i64,
    /// What the guard reported.
    issues: Vec<IssueCode>,
  },

  /// A record's status rules out processing it.
  #[error("Reference record {id} is {status} and cannot be processed")]
  NotProcessable {
    /// The record.
    id:     i64,
    /// Its processing status.
    status: crate::reference::ProcessingStatus,
  },

  /// The record changed between being read and being written.
  #[error("Reference record {0} changed while it was being updated")]
  StaleRecord(i64),

  /// No batch session is registered under the given id.
  #[error("Batch session {0} not found")]
  SessionNotFound(String),

  /// A pause, resume or cancel was requested from a status that doesn't allow it.
  #[error("Cannot {action} a session that is {from}")]
  InvalidTransition {
    /// The requested action.
    action: &'static str,
    /// The status the session was in.
    from:   String,
  },

  /// A batch or service configuration value was rejected.
  #[error("Invalid configuration: {0}")]
  InvalidConfig(String),

  /// A network request to the external item store failed.
  #[error(transparent)]
  Network(#[from] reqwest::Error),

  /// A SQLite operation failed.
  #[error(transparent)]
  Sqlite(#[from] rusqlite::Error),

  /// An async SQLite operation failed.
  #[error(transparent)]
  AsyncSqlite(#[from] tokio_rusqlite::Error),

  /// A file system operation failed.
  #[error(transparent)]
  Path(#[from] std::io::Error),

  /// JSON (de)serialization failed.
  #[error(transparent)]
  Json(#[from] serde_json::Error),

  /// A URL could not be parsed.
  #[error(transparent)]
  UrlParse(#[from] url::ParseError),

  /// The configuration file is not valid TOML.
  #[error(transparent)]
  TomlDe(#[from] toml::de::Error),

  /// The configuration could not be written as TOML.
  #[error(transparent)]
  TomlSer(#[from] toml::ser::Error),

  /// The configuration file could not be read.
  #[error("{0}")]
  Config(String),
}

impl ReftrackError {
  /// Whether retrying the same operation later might succeed.
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::ExternalService(_) | Self::Network(_) | Self::StaleRecord(_))
  }
}
