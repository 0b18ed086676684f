//! The reference record: one tracked URL and its processing lifecycle.
//!
//! A record carries two independent status fields:
//!
//! - [`ProcessingStatus`]: where the record sits in the local workflow
//! - [`StoreStatus`]: whether the external item store holds an item for it
//!
//! together with the opaque [`ItemKey`] the external store assigned. Keeping both fields lets the
//! external store's answer to "does a stored artifact exist" stay separate from local workflow
//! state; the [`guard`](crate::guard) checks the two agree.
//!
//! # Examples
//!
//! ```
//! use std::str::FromStr;
//!
//! use reftrack::reference::{ProcessingStatus, Reference, UserIntent};
//!
//! let record = Reference::new(1, "https://example.org/article");
//! assert_eq!(record.processing_status, ProcessingStatus::NotStarted);
//! assert_eq!(record.intent, UserIntent::Process);
//! assert_eq!(ProcessingStatus::from_str("archived").unwrap(), ProcessingStatus::Archived);
//! ```

use super::*;
use crate::citation::CitationValidation;

/// Opaque identifier the external item store assigns to a stored item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
  /// Wraps a key returned by the external store.
  pub fn new(key: impl Into<String>) -> Self { Self(key.into()) }

  /// The raw key.
  pub fn as_str(&self) -> &str { &self.0 }
}

impl Display for ItemKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for ItemKey {
  fn from(key: &str) -> Self { Self::new(key) }
}

/// Where a record sits in the local processing workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
  /// Discovered or imported, nothing attempted yet.
  #[default]
  NotStarted,
  /// Metadata can be extracted from the page.
  Extractable,
  /// The external store can translate the URL into an item.
  Translatable,
  /// A pipeline run is in progress.
  Processing,
  /// An item exists in the external store.
  Stored,
  /// The last pipeline run failed.
  Failed,
  /// The operator chose to ignore this URL.
  Ignored,
  /// Kept for history but no longer cited.
  Archived,
}

impl ProcessingStatus {
  /// Every variant, in lifecycle order.
  pub const ALL: [ProcessingStatus; 8] = [
    Self::NotStarted,
    Self::Extractable,
    Self::Translatable,
    Self::Processing,
    Self::Stored,
    Self::Failed,
    Self::Ignored,
    Self::Archived,
  ];

  /// The stored name of this status.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::NotStarted => "not_started",
      Self::Extractable => "extractable",
      Self::Translatable => "translatable",
      Self::Processing => "processing",
      Self::Stored => "stored",
      Self::Failed => "failed",
      Self::Ignored => "ignored",
      Self::Archived => "archived",
    }
  }

  /// Statuses in which the record must not be linked to an external item.
  pub fn forbids_item(&self) -> bool { matches!(self, Self::Ignored | Self::Archived) }
}

impl Display for ProcessingStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ProcessingStatus {
  type Err = ReftrackError;

  fn from_str(s: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|status| status.as_str() == s)
      .ok_or_else(|| ReftrackError::InvalidStatus(s.to_string()))
  }
}

/// Whether the external item store holds an item for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreStatus {
  /// A create call is in flight.
  Processing,
  /// The item exists externally.
  Stored,
  /// The last create call failed.
  Failed,
}

impl StoreStatus {
  /// Every variant.
  pub const ALL: [StoreStatus; 3] = [Self::Processing, Self::Stored, Self::Failed];

  /// The stored name of this status.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Processing => "processing",
      Self::Stored => "stored",
      Self::Failed => "failed",
    }
  }
}

impl Display for StoreStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for StoreStatus {
  type Err = ReftrackError;

  fn from_str(s: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|status| status.as_str() == s)
      .ok_or_else(|| ReftrackError::InvalidStatus(s.to_string()))
  }
}

/// What the operator wants done with a record, independent of its current status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserIntent {
  /// Store it externally.
  #[default]
  Process,
  /// Leave it out of batch runs that respect intent.
  Skip,
  /// Retire it.
  Archive,
}

impl UserIntent {
  /// Every variant.
  pub const ALL: [UserIntent; 3] = [Self::Process, Self::Skip, Self::Archive];

  /// The stored name of this intent.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Process => "process",
      Self::Skip => "skip",
      Self::Archive => "archive",
    }
  }
}

impl Display for UserIntent {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for UserIntent {
  type Err = ReftrackError;

  fn from_str(s: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|intent| intent.as_str() == s)
      .ok_or_else(|| ReftrackError::InvalidStatus(s.to_string()))
  }
}

/// One tracked URL within a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
  /// Database id (0 until inserted)
  pub id:                i64,
  /// Owning section
  pub section_id:        i64,
  /// The tracked URL, unique per section
  pub url:               String,
  /// Local workflow status
  pub processing_status: ProcessingStatus,
  /// Key of the external item, once one exists
  pub item_key:          Option<ItemKey>,
  /// External store status; `None` before any store attempt
  pub store_status:      Option<StoreStatus>,
  /// Error from the last store attempt
  pub store_error:       Option<String>,
  /// What the operator wants done with this record
  pub intent:            UserIntent,
  /// Number of pipeline attempts
  pub attempts:          u32,
  /// Error from the last pipeline attempt
  pub last_error:        Option<String>,
  /// Completeness of the stored citation
  pub validation:        Option<CitationValidation>,
  /// When the record was imported
  pub created_at:        DateTime<Utc>,
  /// When any field last changed
  pub updated_at:        DateTime<Utc>,
}

impl Reference {
  /// A fresh, unsaved record for `url` in `section_id`.
  pub fn new(section_id: i64, url: impl Into<String>) -> Self {
    let now = Utc::now();
    Self {
      id: 0,
      section_id,
      url: url.into(),
      processing_status: ProcessingStatus::NotStarted,
      item_key: None,
      store_status: None,
      store_error: None,
      intent: UserIntent::Process,
      attempts: 0,
      last_error: None,
      validation: None,
      created_at: now,
      updated_at: now,
    }
  }

  /// Whether the record is linked to an external item.
  pub fn is_linked(&self) -> bool { self.item_key.is_some() }

  /// Whether the external store reports the item as stored.
  pub fn is_stored(&self) -> bool { self.store_status == Some(StoreStatus::Stored) }
}

/// Checks that `url` is absolute with a host, as every tracked reference must be.
pub fn validate_url(url: &str) -> Result<url::Url> {
  let parsed = url::Url::parse(url.trim())?;
  if parsed.host_str().is_none() || !matches!(parsed.scheme(), "http" | "https") {
    return Err(ReftrackError::InvalidUrl(url.to_string()));
  }
  Ok(parsed)
}
