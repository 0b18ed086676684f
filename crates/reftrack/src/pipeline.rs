//! The per-item pipeline batches run for each record.
//!
//! The orchestrator only knows the [`ItemPipeline`] trait. [`StorePipeline`] is the real
//! implementation: it checks the record with the [`guard`](crate::guard), creates an item in the
//! external store, validates the resulting citation and persists the outcome.

use std::time::Instant;

use super::*;
use crate::{
  citation,
  database::{Query, Update},
  guard::detect_issues,
};

/// What happened to one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
  /// Whether the item ended up stored
  pub success:  bool,
  /// Key of the stored item
  pub item_key: Option<ItemKey>,
  /// Why the item failed
  pub error:    Option<String>,
  /// Wall time spent on the item
  pub duration: Duration,
}

impl ItemOutcome {
  /// A stored item.
  pub fn succeeded(item_key: ItemKey, duration: Duration) -> Self {
    Self { success: true, item_key: Some(item_key), error: None, duration }
  }

  /// A failure, keeping only the error's message.
  pub fn failed(error: impl Display, duration: Duration) -> Self {
    Self { success: false, item_key: None, error: Some(error.to_string()), duration }
  }
}

/// Work done for one record inside a batch.
///
/// Implementations must not panic on ordinary failures; they report them as an unsuccessful
/// [`ItemOutcome`] so the batch can carry on.
#[async_trait]
pub trait ItemPipeline: Send + Sync {
  /// Processes one record.
  async fn process(&self, record_id: i64) -> ItemOutcome;

  /// The record's user intent, consulted when a batch respects intent.
  ///
  /// `None` means unknown, which is treated as "process".
  async fn user_intent(&self, _record_id: i64) -> Result<Option<UserIntent>> { Ok(None) }
}

/// Pipeline storing records in the external item store.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use reftrack::{
///   database::Database, pipeline::StorePipeline, prelude::*, store::CitationLinker, Config,
/// };
///
/// # async fn example() -> Result<(), ReftrackError> {
/// let db = Database::open(Database::default_path()).await?;
/// let linker = CitationLinker::from_config(&Config::default().service)?;
/// let pipeline = StorePipeline::new(db, Arc::new(linker));
///
/// let outcome = pipeline.process(12).await;
/// println!("stored: {} ({:?})", outcome.success, outcome.item_key);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct StorePipeline {
  /// Record storage
  db:    Database,
  /// External item store
  items: Arc<dyn ItemStore>,
}

impl StorePipeline {
  /// Pipeline storing records from `db` in `items`.
  pub fn new(db: Database, items: Arc<dyn ItemStore>) -> Self { Self { db, items } }

  /// Runs the pipeline, returning the item key on success.
  ///
  /// Store failures are persisted on the record before being returned.
  async fn store(&self, record_id: i64) -> Result<ItemKey> {
    let _lock = self.db.lock_record(record_id).await;
    let record = self.db.get(record_id).await?;

    let issues = detect_issues(&record);
    if !issues.is_empty() {
      return Err(ReftrackError::IntegrityViolation { id: record_id, issues });
    }
    if let (true, Some(key)) = (record.is_stored(), &record.item_key) {
      debug!(id = record_id, %key, "Already stored");
      return Ok(key.clone());
    }
    if record.processing_status.forbids_item() {
      return Err(ReftrackError::NotProcessable { id: record_id, status: record.processing_status });
    }

    let attempts = record.attempts + 1;
    let record = Update::new(record_id)
      .processing_status(ProcessingStatus::Processing)
      .store_status(Some(StoreStatus::Processing))
      .store_error(None)
      .attempts(attempts)
      .guarded(&record)
      .execute(&self.db)
      .await?;

    let key = match self.items.create_item(&record.url).await {
      Ok(key) => key,
      Err(e) => {
        let message = e.to_string();
        Update::new(record_id)
          .processing_status(ProcessingStatus::Failed)
          .store_status(Some(StoreStatus::Failed))
          .store_error(Some(message.clone()))
          .last_error(Some(message))
          .execute(&self.db)
          .await?;
        return Err(e);
      },
    };

    // A stored item with unreadable metadata is still stored; only the validation is unknown.
    let validation = match self.items.get_item_metadata(&key).await {
      Ok(metadata) => Some(citation::validate(&metadata)),
      Err(e) => {
        warn!(id = record_id, %key, error = %e, "Could not fetch item metadata");
        None
      },
    };

    Update::new(record_id)
      .processing_status(ProcessingStatus::Stored)
      .store_status(Some(StoreStatus::Stored))
      .item_key(Some(key.clone()))
      .last_error(None)
      .validation(validation)
      .execute(&self.db)
      .await?;
    info!(id = record_id, %key, "Stored reference");
    Ok(key)
  }
}

#[async_trait]
impl ItemPipeline for StorePipeline {
  async fn process(&self, record_id: i64) -> ItemOutcome {
    let started = Instant::now();
    match self.store(record_id).await {
      Ok(key) => ItemOutcome::succeeded(key, started.elapsed()),
      Err(e) => {
        debug!(id = record_id, error = %e, "Item failed");
        ItemOutcome::failed(e, started.elapsed())
      },
    }
  }

  async fn user_intent(&self, record_id: i64) -> Result<Option<UserIntent>> {
    Ok(Query::by_id(record_id).execute(&self.db).await?.pop().map(|record| record.intent))
  }
}
