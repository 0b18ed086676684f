//! Applying repair plans, plus the explicit unlink and delete actions.
//!
//! Every write here follows the same order:
//! 1. Take the record's lock and re-read it, so the decision is made on current data
//! 2. Delete the external item first when the change requires it
//! 3. Write all local field changes in one guarded transaction
//!
//! If the external delete fails nothing local is written, so the record still carries the key
//! of the item that exists and the operation can simply be retried.

use super::*;
use crate::{
  database::{DatabaseInstruction, Update},
  guard::{detect_issues, suggest_repair, IssueCode, RepairPlan},
};

/// Result of a successful [`Repairer::repair`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
  /// The record was already consistent; nothing was written.
  NoIssueFound,
  /// The plan was applied.
  Repaired {
    /// The applied plan.
    plan: RepairPlan,
  },
}

/// Current integrity state of one record, for display before a repair.
#[derive(Debug, Clone)]
pub struct Diagnosis {
  /// The record as read
  pub record: Reference,
  /// Violated invariants
  pub issues: Vec<IssueCode>,
  /// Proposed plan, if any
  pub plan:   Option<RepairPlan>,
}

impl Diagnosis {
  /// Whether the record needs attention.
  pub fn has_issues(&self) -> bool { !self.issues.is_empty() }
}

/// Executes repairs and linkage changes against the database and the external store.
#[derive(Clone)]
pub struct Repairer {
  /// Record storage
  db:    Database,
  /// External item store
  items: Arc<dyn ItemStore>,
}

impl Repairer {
  /// Repairer writing through `db` and deleting through `items`.
  pub fn new(db: Database, items: Arc<dyn ItemStore>) -> Self { Self { db, items } }

  /// Reads a record and reports its issues and the plan that would fix them.
  pub async fn diagnose(&self, record_id: i64) -> Result<Diagnosis> {
    let record = self.db.get(record_id).await?;
    let issues = detect_issues(&record);
    let plan = suggest_repair(&record);
    Ok(Diagnosis { record, issues, plan })
  }

  /// Brings a record back into a consistent state.
  ///
  /// Idempotent: repairing a consistent record returns [`RepairOutcome::NoIssueFound`]. Never
  /// retries; external store failures come back as [`ReftrackError::ExternalService`].
  pub async fn repair(&self, record_id: i64) -> Result<RepairOutcome> {
    let _lock = self.db.lock_record(record_id).await;
    let record = self.db.get(record_id).await?;

    let issues = detect_issues(&record);
    if issues.is_empty() {
      debug!(id = record_id, "No issues found");
      return Ok(RepairOutcome::NoIssueFound);
    }
    let Some(plan) = suggest_repair(&record) else {
      warn!(id = record_id, ?issues, "Repair requires manual correction");
      return Err(ReftrackError::NoApplicablePlan { issues });
    };

    if let Some(key) = &plan.delete_item {
      self.delete_external(record_id, key).await?;
    }
    Update::from_plan(&record, &plan).execute(&self.db).await?;

    info!(id = record_id, ?issues, reasoning = %plan.reasoning, "Repaired record");
    Ok(RepairOutcome::Repaired { plan })
  }

  /// Drops the link between a record and its external item without touching the item.
  ///
  /// Returns the updated record; unlinking an unlinked record changes nothing.
  pub async fn unlink(&self, record_id: i64) -> Result<Reference> {
    let _lock = self.db.lock_record(record_id).await;
    let record = self.db.get(record_id).await?;
    if !record.is_linked() && record.store_status.is_none() {
      return Ok(record);
    }
    let updated = Update::unlink(&record).execute(&self.db).await?;
    info!(id = record_id, "Unlinked record");
    Ok(updated)
  }

  /// Deletes a record's external item, then clears the local linkage.
  ///
  /// The local record itself is kept.
  pub async fn delete(&self, record_id: i64) -> Result<Reference> {
    let _lock = self.db.lock_record(record_id).await;
    let record = self.db.get(record_id).await?;
    let Some(key) = record.item_key.clone() else {
      debug!(id = record_id, "Nothing to delete");
      return Ok(record);
    };

    self.delete_external(record_id, &key).await?;
    let updated = Update::unlink(&record).execute(&self.db).await?;
    info!(id = record_id, %key, "Deleted item");
    Ok(updated)
  }

  /// Deletes an external item, reporting any failure as a recoverable service error.
  async fn delete_external(&self, record_id: i64, key: &ItemKey) -> Result<()> {
    self.items.delete_item(key).await.map_err(|e| {
      warn!(id = record_id, %key, error = %e, "External delete failed; local record unchanged");
      match e {
        ReftrackError::ExternalService(_) => e,
        other => ReftrackError::ExternalService(other.to_string()),
      }
    })
  }
}
