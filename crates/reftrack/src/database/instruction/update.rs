//! Writing field changes.
//!
//! [`Update`] collects the fields to change and writes them in one transaction. A guarded update
//! only applies when the record still holds the status, store status and item key it was read
//! with, and fails with [`ReftrackError::StaleRecord`] otherwise.

use rusqlite::{params_from_iter, types::Value};

use super::*;
use crate::guard::{FieldChange, RepairPlan};

/// Values a guarded update expects to find before writing.
#[derive(Debug, Clone)]
struct Expected {
  /// Processing status at read time
  processing_status: ProcessingStatus,
  /// Store status at read time
  store_status:      Option<StoreStatus>,
  /// Item key at read time
  item_key:          Option<ItemKey>,
}

/// Instruction writing a set of field changes to one record.
///
/// Unset fields are left alone; `updated_at` is always refreshed. Returns the record as stored
/// after the write.
///
/// # Examples
///
/// ```no_run
/// use reftrack::{
///   database::{Database, Update},
///   prelude::*,
///   reference::{ProcessingStatus, StoreStatus},
/// };
///
/// # async fn example(db: &Database) -> Result<(), ReftrackError> {
/// let record = db.get(7).await?;
/// let updated = Update::new(record.id)
///   .processing_status(ProcessingStatus::Failed)
///   .store_status(Some(StoreStatus::Failed))
///   .guarded(&record)
///   .execute(db)
///   .await?;
/// assert_eq!(updated.processing_status, ProcessingStatus::Failed);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Update {
  /// Record to update
  id:                i64,
  /// New processing status
  processing_status: Option<ProcessingStatus>,
  /// New item key
  item_key:          Option<Option<ItemKey>>,
  /// New store status
  store_status:      Option<Option<StoreStatus>>,
  /// New store error
  store_error:       Option<Option<String>>,
  /// New user intent
  intent:            Option<UserIntent>,
  /// New attempt count
  attempts:          Option<u32>,
  /// New last error
  last_error:        Option<Option<String>>,
  /// New citation validation
  validation:        Option<Option<CitationValidation>>,
  /// Optimistic check, if any
  expected:          Option<Expected>,
}

impl Update {
  /// An empty change set for record `id`.
  pub fn new(id: i64) -> Self { Self { id, ..Self::default() } }

  /// Builds the update that persists `plan` for `record`, guarded against concurrent changes.
  ///
  /// Clearing the store status also clears any stored error.
  pub fn from_plan(record: &Reference, plan: &RepairPlan) -> Self {
    let mut update = Self::new(record.id).guarded(record);
    for change in &plan.changes {
      update = match change {
        FieldChange::ProcessingStatus { to, .. } => update.processing_status(*to),
        FieldChange::StoreStatus { to: None, .. } => update.store_status(None).store_error(None),
        FieldChange::StoreStatus { to, .. } => update.store_status(*to),
        FieldChange::ItemKey { to, .. } => update.item_key(to.clone()),
      };
    }
    update
  }

  /// Builds the update that drops `record`'s link to its external item.
  ///
  /// A record that was `stored` goes back to `not_started`, since nothing is stored for it any
  /// more.
  pub fn unlink(record: &Reference) -> Self {
    let update =
      Self::new(record.id).item_key(None).store_status(None).store_error(None).guarded(record);
    if record.processing_status == ProcessingStatus::Stored {
      update.processing_status(ProcessingStatus::NotStarted)
    } else {
      update
    }
  }

  /// Sets `processing_status`.
  pub fn processing_status(mut self, status: ProcessingStatus) -> Self {
    self.processing_status = Some(status);
    self
  }

  /// Sets `item_key`.
  pub fn item_key(mut self, key: Option<ItemKey>) -> Self {
    self.item_key = Some(key);
    self
  }

  /// Sets `store_status`.
  pub fn store_status(mut self, status: Option<StoreStatus>) -> Self {
    self.store_status = Some(status);
    self
  }

  /// Sets `store_error`.
  pub fn store_error(mut self, error: Option<String>) -> Self {
    self.store_error = Some(error);
    self
  }

  /// Sets `intent`.
  pub fn intent(mut self, intent: UserIntent) -> Self {
    self.intent = Some(intent);
    self
  }

  /// Sets `attempts`.
  pub fn attempts(mut self, attempts: u32) -> Self {
    self.attempts = Some(attempts);
    self
  }

  /// Sets `last_error`.
  pub fn last_error(mut self, error: Option<String>) -> Self {
    self.last_error = Some(error);
    self
  }

  /// Sets `validation`.
  pub fn validation(mut self, validation: Option<CitationValidation>) -> Self {
    self.validation = Some(validation);
    self
  }

  /// Only write if the record still matches `record`'s processing status, store status and
  /// item key.
  pub fn guarded(mut self, record: &Reference) -> Self {
    self.expected = Some(Expected {
      processing_status: record.processing_status,
      store_status:      record.store_status,
      item_key:          record.item_key.clone(),
    });
    self
  }

  /// The UPDATE statement and its parameters.
  fn build_sql(&self) -> Result<(String, Vec<Value>)> {
    let mut assignments = Vec::new();
    let mut params = Vec::new();
    let mut set = |column: &str, value: Value| {
      params.push(value);
      assignments.push(format!("{column} = ?{}", params.len()));
    };

    if let Some(status) = self.processing_status {
      set("processing_status", text(Some(status.as_str())));
    }
    if let Some(key) = &self.item_key {
      set("item_key", text(key.as_ref().map(ItemKey::as_str)));
    }
    if let Some(status) = self.store_status {
      set("store_status", text(status.as_ref().map(StoreStatus::as_str)));
    }
    if let Some(error) = &self.store_error {
      set("store_error", text(error.as_deref()));
    }
    if let Some(intent) = self.intent {
      set("intent", text(Some(intent.as_str())));
    }
    if let Some(attempts) = self.attempts {
      set("attempts", Value::Integer(i64::from(attempts)));
    }
    if let Some(error) = &self.last_error {
      set("last_error", text(error.as_deref()));
    }
    if let Some(validation) = &self.validation {
      let json = validation.as_ref().map(serde_json::to_string).transpose()?;
      set("validation", text(json.as_deref()));
    }
    set("updated_at", Value::Text(Utc::now().format("%F %T%.f%:z").to_string()));

    let mut sql = format!("UPDATE reference_records SET {} WHERE id = ?", assignments.join(", "));
    params.push(Value::Integer(self.id));
    sql.push_str(&params.len().to_string());

    if let Some(expected) = &self.expected {
      let base = params.len();
      sql.push_str(&format!(
        " AND processing_status = ?{} AND store_status IS ?{} AND item_key IS ?{}",
        base + 1,
        base + 2,
        base + 3
      ));
      params.push(text(Some(expected.processing_status.as_str())));
      params.push(text(expected.store_status.as_ref().map(StoreStatus::as_str)));
      params.push(text(expected.item_key.as_ref().map(ItemKey::as_str)));
    }
    Ok((sql, params))
  }
}

/// A nullable text parameter.
fn text(value: Option<&str>) -> Value { value.map_or(Value::Null, |v| Value::Text(v.to_string())) }

#[async_trait]
impl DatabaseInstruction for Update {
  type Output = Reference;

  async fn execute(&self, db: &Database) -> Result<Self::Output> {
    let (sql, params) = self.build_sql()?;
    let id = self.id;
    trace!(id, %sql, "Updating record");

    let record = db
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(&sql, params_from_iter(params))?;
        if changed == 0 {
          let exists = tx
            .query_row("SELECT 1 FROM reference_records WHERE id = ?1", [id], |_| Ok(()))
            .optional()?
            .is_some();
          return Ok(Err(if exists {
            ReftrackError::StaleRecord(id)
          } else {
            ReftrackError::NotFound(id)
          }));
        }
        let record = tx.query_row(
          &format!("SELECT {REFERENCE_COLUMNS} FROM reference_records WHERE id = ?1"),
          [id],
          reference_from_row,
        )?;
        tx.commit()?;
        Ok(Ok(record))
      })
      .await??;

    Ok(record)
  }
}

/// Instruction recording what the operator wants done with a record.
///
/// Archiving also moves the record to `archived`; asking to process an archived or ignored
/// record again puts it back to `not_started`. The write is guarded, so it fails with
/// [`ReftrackError::StaleRecord`] if a pipeline run changed the record meanwhile.
#[derive(Debug, Clone)]
pub struct SetIntent {
  /// Record to change
  id:     i64,
  /// New intent
  intent: UserIntent,
}

impl SetIntent {
  /// Sets the intent of record `id`.
  pub fn new(id: i64, intent: UserIntent) -> Self { Self { id, intent } }
}

#[async_trait]
impl DatabaseInstruction for SetIntent {
  type Output = Reference;

  async fn execute(&self, db: &Database) -> Result<Self::Output> {
    let record = db.get(self.id).await?;
    let update = Update::new(self.id).intent(self.intent).guarded(&record);
    let update = match (self.intent, record.processing_status) {
      (UserIntent::Archive, _) => update.processing_status(ProcessingStatus::Archived),
      (UserIntent::Process, status) if status.forbids_item() =>
        update.processing_status(ProcessingStatus::NotStarted),
      _ => update,
    };
    let updated = update.execute(db).await?;
    debug!(id = self.id, intent = %self.intent, status = %updated.processing_status, "Set intent");
    Ok(updated)
  }
}
