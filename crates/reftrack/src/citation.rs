//! Completeness checks for citations produced by the external item store.
//!
//! After an item is stored, its metadata is checked for the fields a formatted citation needs.
//! A citation is incomplete when:
//! - the rendered citation text is empty
//! - neither the citation text nor the item date carries a year
//! - the item has no title
//! - the item has no URL

use lazy_static::lazy_static;
use regex::Regex;

use super::*;
use crate::store::ItemMetadata;

lazy_static! {
  /// Four-digit years in the range a web reference can plausibly carry.
  static ref YEAR: Regex = Regex::new(r"\b(19|20)\d{2}\b").unwrap();
}

/// Outcome of checking a stored citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CitationValidation {
  /// Every required field is present.
  Valid,
  /// Some fields are missing; they are listed by name.
  Incomplete {
    /// Names of the missing fields.
    missing_fields: Vec<String>,
  },
}

impl CitationValidation {
  /// Whether the citation passed.
  pub fn is_valid(&self) -> bool { matches!(self, Self::Valid) }

  /// The missing field names, empty when valid.
  pub fn missing_fields(&self) -> &[String] {
    match self {
      Self::Valid => &[],
      Self::Incomplete { missing_fields } => missing_fields,
    }
  }
}

/// Whether `text` contains a plausible publication year.
pub fn has_year(text: &str) -> bool { YEAR.is_match(text) }

/// Checks item metadata for the fields a citation needs.
pub fn validate(metadata: &ItemMetadata) -> CitationValidation {
  let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());

  let mut missing_fields = Vec::new();
  if !present(&metadata.citation) {
    missing_fields.push("citation".to_string());
  }
  let dated = [&metadata.citation, &metadata.date]
    .into_iter()
    .any(|value| value.as_deref().is_some_and(has_year));
  if !dated {
    missing_fields.push("date".to_string());
  }
  if !present(&metadata.title) {
    missing_fields.push("title".to_string());
  }
  if !present(&metadata.url) {
    missing_fields.push("url".to_string());
  }

  if missing_fields.is_empty() {
    CitationValidation::Valid
  } else {
    trace!(key = %metadata.key, ?missing_fields, "Citation incomplete");
    CitationValidation::Incomplete { missing_fields }
  }
}
