//! Integrity checking, repair and batch orchestration for tracked web references.
//!
//! `reftrack` keeps a local record for every URL a project cites and links it to an item in an
//! external reference manager (a Zotero library reached through its local connector). It
//! provides:
//!
//! - A dual-state model per record: where it sits in the local workflow and whether it is stored
//!   externally
//! - A state guard that names every integrity violation and proposes a single repair plan
//! - A repair executor that applies plans atomically, deleting external items first when needed
//! - A non-blocking batch orchestrator with bounded concurrency, pause/resume/cancel and
//!   poll-based progress reporting
//!
//! # Getting Started
//!
//! ```no_run
//! use reftrack::{batch::BatchConfig, prelude::*, Config, Reftrack};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!   let reftrack = Reftrack::open(Config::default()).await?;
//!
//!   // Track a URL in a section
//!   let section = reftrack.database.ensure_section("introduction").await?;
//!   let record = reftrack.add_reference(section, "https://example.org/paper").await?;
//!
//!   // Check it, then push a batch through the external store
//!   let diagnosis = reftrack.repairer.diagnose(record.id).await?;
//!   assert!(diagnosis.issues.is_empty());
//!
//!   let session = reftrack.orchestrator.create_and_start(vec![record.id], BatchConfig::default())?;
//!   let done = reftrack.wait_for(&session.id, |_| {}).await;
//!   println!("{} stored, {} failed", done.completed.len(), done.failed.len());
//!   Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`reference`]: The reference record and its status enums
//! - [`guard`]: Pure integrity checks and repair planning
//! - [`repair`]: Applying repair plans and explicit unlink/delete actions
//! - [`store`]: The external item store abstraction and its HTTP client
//! - [`pipeline`]: The per-item processing pipeline run by batches
//! - [`batch`]: Batch sessions, the orchestrator and the status poller
//! - [`database`]: SQLite persistence for sections and records
//! - [`citation`]: Completeness checks for stored citations
//! - [`config`]: On-disk configuration

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::{
  collections::HashMap,
  fmt::Display,
  path::{Path, PathBuf},
  str::FromStr,
  sync::Arc,
  time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
#[cfg(test)]
use {tempfile::tempdir, tracing_test::traced_test};

pub mod batch;
pub mod citation;
pub mod config;
pub mod database;
pub mod error;
pub mod guard;
pub mod pipeline;
pub mod reference;
pub mod repair;
pub mod store;

pub use crate::config::Config;
use crate::{
  batch::{BatchSession, Orchestrator, SessionId},
  database::{Add, Database, DatabaseInstruction},
  error::*,
  pipeline::StorePipeline,
  reference::*,
  repair::Repairer,
  store::{CitationLinker, ItemStore},
};

/// Common traits and types for ergonomic imports.
///
/// ```no_run
/// use reftrack::{database::Database, prelude::*};
///
/// async fn example() -> Result<(), ReftrackError> {
///   let db = Database::open(Database::default_path()).await?;
///   let records = reftrack::database::Query::list_all().execute(&db).await?;
///   println!("{} records", records.len());
///   Ok(())
/// }
/// ```
pub mod prelude {
  pub use crate::{
    batch::StatusSource, database::DatabaseInstruction, error::ReftrackError,
    pipeline::ItemPipeline, store::ItemStore,
  };
}

/// Everything needed to curate references, wired together from a [`Config`].
///
/// The database handle, repairer and orchestrator share one connection and one item store, so
/// repairs and batch runs observe the same per-record locks. A background task sweeps expired
/// batch sessions every `batch.sweep_interval_secs` until the instance is dropped.
pub struct Reftrack {
  /// Configuration this instance was opened with.
  pub config:       Config,
  /// Record storage.
  pub database:     Database,
  /// Integrity repair and explicit unlink/delete actions.
  pub repairer:     Repairer,
  /// Batch session registry and runner.
  pub orchestrator: Orchestrator,
  /// Periodic retention sweep over the orchestrator's sessions.
  sweeper:          JoinHandle<()>,
}

impl Reftrack {
  /// Opens the database named by `config` and connects to the configured item store.
  pub async fn open(config: Config) -> Result<Self> {
    let items: Arc<dyn ItemStore> = Arc::new(CitationLinker::from_config(&config.service)?);
    Self::with_item_store(config, items).await
  }

  /// Like [`Reftrack::open`] but with a caller-supplied item store.
  pub async fn with_item_store(config: Config, items: Arc<dyn ItemStore>) -> Result<Self> {
    if let Some(parent) = config.database_path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    let database = Database::open(&config.database_path).await?;
    let repairer = Repairer::new(database.clone(), Arc::clone(&items));
    let pipeline = Arc::new(StorePipeline::new(database.clone(), items));
    let orchestrator = Orchestrator::new(pipeline).with_retention(config.batch.retention());
    let sweeper = orchestrator.spawn_sweeper(config.batch.sweep_interval());
    debug!(path = %config.database_path.display(), "Opened reftrack");
    Ok(Self { config, database, repairer, orchestrator, sweeper })
  }

  /// Tracks a new URL in the given section.
  pub async fn add_reference(&self, section_id: i64, url: &str) -> Result<Reference> {
    Add::new(section_id, url).execute(&self.database).await
  }

  /// Polls a batch session at the configured interval until it is terminal.
  pub async fn wait_for<F>(&self, session_id: &SessionId, on_update: F) -> BatchSession
  where F: FnMut(&BatchSession) + Send {
    batch::poll_until_terminal(
      &self.orchestrator,
      session_id,
      self.config.batch.poll_interval(),
      on_update,
    )
    .await
  }
}

impl Drop for Reftrack {
  fn drop(&mut self) { self.sweeper.abort(); }
}
