//! Integrity checks over a single reference record.
//!
//! The guard evaluates a closed rule table on read, rather than collapsing the two status fields
//! into one. Four invariants are checked:
//!
//! | Code                      | Violated when                                                    |
//! |---------------------------|------------------------------------------------------------------|
//! | `LINKED_BUT_NOT_STORED`   | an item key is present but store status is not `stored`          |
//! | `STORED_BUT_NO_ITEM`      | store status is `stored` but there is no item key                |
//! | `DUAL_STATE_MISMATCH`     | processing `stored` without store `stored`, or store `stored` with processing `failed` |
//! | `ITEM_EXISTS_WRONG_STATE` | an item key is present while processing is `ignored`/`archived`  |
//!
//! Everything here is pure: nothing touches storage or the external store. Applying a plan is
//! the job of the [`repair`](crate::repair) module.
//!
//! # Examples
//!
//! ```
//! use reftrack::{
//!   guard::{detect_issues, suggest_repair, IssueCode},
//!   reference::{ItemKey, ProcessingStatus, Reference, StoreStatus},
//! };
//!
//! let mut record = Reference::new(1, "https://example.org");
//! record.processing_status = ProcessingStatus::Archived;
//! record.item_key = Some(ItemKey::new("ABC123"));
//! record.store_status = Some(StoreStatus::Stored);
//!
//! assert_eq!(detect_issues(&record), vec![IssueCode::ItemExistsWrongState]);
//! let plan = suggest_repair(&record).unwrap();
//! assert_eq!(plan.delete_item, Some(ItemKey::new("ABC123")));
//! assert!(detect_issues(&plan.apply(&record)).is_empty());
//! ```

use super::*;

/// Upper bound on rule applications while building one plan.
///
/// Each rule removes its own issue and the table has four rules, so a sound plan never needs
/// more passes than this.
const MAX_RULE_PASSES: usize = 4;

/// A named integrity violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
  /// An item key is present but store status is not `stored`.
  LinkedButNotStored,
  /// Store status is `stored` but there is no item key.
  StoredButNoItem,
  /// Processing status and store status disagree.
  DualStateMismatch,
  /// An item key exists while the record is ignored or archived.
  ItemExistsWrongState,
}

impl IssueCode {
  /// The banner name of this issue.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::LinkedButNotStored => "LINKED_BUT_NOT_STORED",
      Self::StoredButNoItem => "STORED_BUT_NO_ITEM",
      Self::DualStateMismatch => "DUAL_STATE_MISMATCH",
      Self::ItemExistsWrongState => "ITEM_EXISTS_WRONG_STATE",
    }
  }

  /// One-line explanation for operators.
  pub fn description(&self) -> &'static str {
    match self {
      Self::LinkedButNotStored => "Record has an item key but is not marked as stored",
      Self::StoredButNoItem => "Record is marked as stored but has no item key",
      Self::DualStateMismatch => "Processing status and store status disagree",
      Self::ItemExistsWrongState => "An external item exists for an ignored or archived record",
    }
  }

  /// Lower runs first. Item-key consistency comes before workflow status, since the external
  /// store decides whether a stored artifact exists.
  fn priority(&self) -> u8 {
    match self {
      Self::LinkedButNotStored | Self::StoredButNoItem => 0,
      Self::ItemExistsWrongState => 1,
      Self::DualStateMismatch => 2,
    }
  }
}

impl Display for IssueCode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// One field-level change in a [`RepairPlan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum FieldChange {
  /// Change to [`Reference::processing_status`].
  ProcessingStatus {
    /// Current value.
    from: ProcessingStatus,
    /// Proposed value.
    to:   ProcessingStatus,
  },
  /// Change to [`Reference::store_status`].
  StoreStatus {
    /// Current value.
    from: Option<StoreStatus>,
    /// Proposed value.
    to:   Option<StoreStatus>,
  },
  /// Change to [`Reference::item_key`].
  ItemKey {
    /// Current value.
    from: Option<ItemKey>,
    /// Proposed value.
    to:   Option<ItemKey>,
  },
}

impl FieldChange {
  /// Name of the changed field.
  pub fn field(&self) -> &'static str {
    match self {
      Self::ProcessingStatus { .. } => "processing_status",
      Self::StoreStatus { .. } => "store_status",
      Self::ItemKey { .. } => "item_key",
    }
  }

  /// Writes the proposed value into `record`.
  fn apply_to(&self, record: &mut Reference) {
    match self {
      Self::ProcessingStatus { to, .. } => record.processing_status = *to,
      Self::StoreStatus { to, .. } => record.store_status = *to,
      Self::ItemKey { to, .. } => record.item_key = to.clone(),
    }
  }
}

/// Renders an optional value the way banners show it.
fn or_none<T: Display>(value: &Option<T>) -> String {
  value.as_ref().map_or_else(|| "none".to_string(), ToString::to_string)
}

impl Display for FieldChange {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::ProcessingStatus { from, to } => write!(f, "{}: {from} -> {to}", self.field()),
      Self::StoreStatus { from, to } =>
        write!(f, "{}: {} -> {}", self.field(), or_none(from), or_none(to)),
      Self::ItemKey { from, to } =>
        write!(f, "{}: {} -> {}", self.field(), or_none(from), or_none(to)),
    }
  }
}

/// A proposed correction for one record.
///
/// A plan never mutates anything by itself; see [`RepairPlan::apply`] for a projection and
/// [`Repairer::repair`](crate::repair::Repairer::repair) for the persisted version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairPlan {
  /// Issues detected on the record the plan was built from.
  pub issues:      Vec<IssueCode>,
  /// Field changes, one per field at most.
  pub changes:     Vec<FieldChange>,
  /// External item that must be deleted before the local changes are written.
  pub delete_item: Option<ItemKey>,
  /// Human-readable explanation of the plan.
  pub reasoning:   String,
}

impl RepairPlan {
  /// The record as it would look after the plan's field changes.
  pub fn apply(&self, record: &Reference) -> Reference {
    let mut repaired = record.clone();
    for change in &self.changes {
      change.apply_to(&mut repaired);
    }
    repaired
  }

  /// Whether applying the plan requires a call to the external store.
  pub fn requires_external_delete(&self) -> bool { self.delete_item.is_some() }
}

/// Reports every invariant `record` currently violates, in `I1..I4` order.
///
/// Returns an empty list when the record is consistent.
pub fn detect_issues(record: &Reference) -> Vec<IssueCode> {
  let linked = record.is_linked();
  let stored = record.is_stored();
  let status = record.processing_status;

  let mut issues = Vec::new();
  if linked && !stored {
    issues.push(IssueCode::LinkedButNotStored);
  }
  if stored && !linked {
    issues.push(IssueCode::StoredButNoItem);
  }
  if (status == ProcessingStatus::Stored && !stored)
    || (stored && status == ProcessingStatus::Failed)
  {
    issues.push(IssueCode::DualStateMismatch);
  }
  if linked && status.forbids_item() {
    issues.push(IssueCode::ItemExistsWrongState);
  }
  issues
}

/// Proposes a single plan that clears every issue on `record`.
///
/// Rules are applied one at a time, highest priority first, to a projected copy of the record
/// until it is consistent; the plan is the difference between the original and the projection.
/// Returns `None` when the record is consistent or when no rule sequence makes it so, which
/// callers must treat as requiring manual intervention.
pub fn suggest_repair(record: &Reference) -> Option<RepairPlan> {
  let issues = detect_issues(record);
  if issues.is_empty() {
    return None;
  }

  let mut projected = record.clone();
  let mut delete_item = None;
  let mut reasons = Vec::new();
  for _ in 0..MAX_RULE_PASSES {
    let Some(issue) = detect_issues(&projected).into_iter().min_by_key(IssueCode::priority) else {
      break;
    };
    reasons.push(apply_rule(issue, &mut projected, &mut delete_item));
  }

  if !detect_issues(&projected).is_empty() {
    warn!(id = record.id, ?issues, "No repair rule sequence resolves these issues");
    return None;
  }

  Some(RepairPlan {
    changes: diff(record, &projected),
    issues,
    delete_item,
    reasoning: reasons.join(" "),
  })
}

/// Applies the rule for `issue` to `record`, returning the reasoning for it.
fn apply_rule(issue: IssueCode, record: &mut Reference, delete_item: &mut Option<ItemKey>) -> String {
  match issue {
    IssueCode::LinkedButNotStored => {
      record.store_status = Some(StoreStatus::Stored);
      format!(
        "Item key {} is present, so the item exists in the external store: mark it stored.",
        or_none(&record.item_key)
      )
    },
    IssueCode::StoredButNoItem => {
      record.store_status = None;
      "Marked stored without an item key, so nothing is stored externally: reset store status."
        .to_string()
    },
    IssueCode::ItemExistsWrongState => {
      let key = record.item_key.take();
      record.store_status = None;
      let reason = format!(
        "Records that are {} must not keep an external item: delete {} and unlink.",
        record.processing_status,
        or_none(&key)
      );
      *delete_item = key;
      reason
    },
    IssueCode::DualStateMismatch => {
      let from = record.processing_status;
      record.processing_status = match record.store_status {
        Some(StoreStatus::Stored) => ProcessingStatus::Stored,
        Some(StoreStatus::Failed) => ProcessingStatus::Failed,
        Some(StoreStatus::Processing) | None => ProcessingStatus::NotStarted,
      };
      format!(
        "Processing status {from} disagrees with store status {}: follow the store and set {}.",
        or_none(&record.store_status),
        record.processing_status
      )
    },
  }
}

/// Field changes that turn `before` into `after`.
fn diff(before: &Reference, after: &Reference) -> Vec<FieldChange> {
  let mut changes = Vec::new();
  if before.item_key != after.item_key {
    changes.push(FieldChange::ItemKey {
      from: before.item_key.clone(),
      to:   after.item_key.clone(),
    });
  }
  if before.store_status != after.store_status {
    changes.push(FieldChange::StoreStatus { from: before.store_status, to: after.store_status });
  }
  if before.processing_status != after.processing_status {
    changes.push(FieldChange::ProcessingStatus {
      from: before.processing_status,
      to:   after.processing_status,
    });
  }
  changes
}
