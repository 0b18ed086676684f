//! Looking records up.

use rusqlite::{params_from_iter, types::Value};

use super::*;

/// What a [`Query`] selects on.
#[derive(Debug, Clone)]
pub enum QueryCriteria {
  /// A single record.
  Id(i64),
  /// Several records, returned in id order.
  Ids(Vec<i64>),
  /// Every record in a section.
  Section(i64),
  /// Records in a processing status.
  Status(ProcessingStatus),
  /// Records with a user intent.
  Intent(UserIntent),
  /// Records linked to an external item.
  Linked,
  /// Everything.
  All,
}

/// Instruction returning the records matching some criteria, ordered by id.
#[derive(Debug, Clone)]
pub struct Query {
  /// Selection criteria
  criteria: QueryCriteria,
  /// Optional row limit
  limit:    Option<usize>,
}

impl Query {
  /// A query without a row limit.
  pub fn new(criteria: QueryCriteria) -> Self { Self { criteria, limit: None } }

  /// The record with this id, if any.
  pub fn by_id(id: i64) -> Self { Self::new(QueryCriteria::Id(id)) }

  /// Records with any of these ids, in id order.
  pub fn by_ids(ids: impl Into<Vec<i64>>) -> Self { Self::new(QueryCriteria::Ids(ids.into())) }

  /// Every record in a section.
  pub fn by_section(section_id: i64) -> Self { Self::new(QueryCriteria::Section(section_id)) }

  /// Records in one processing status.
  pub fn by_status(status: ProcessingStatus) -> Self { Self::new(QueryCriteria::Status(status)) }

  /// Records with one user intent.
  pub fn by_intent(intent: UserIntent) -> Self { Self::new(QueryCriteria::Intent(intent)) }

  /// Records carrying an item key.
  pub fn linked() -> Self { Self::new(QueryCriteria::Linked) }

  /// Every record.
  pub fn list_all() -> Self { Self::new(QueryCriteria::All) }

  /// Returns at most `limit` records.
  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }

  /// The WHERE clause and its parameters.
  fn build_criteria_sql(&self) -> (String, Vec<Value>) {
    match &self.criteria {
      QueryCriteria::Id(id) => ("WHERE id = ?1".into(), vec![Value::Integer(*id)]),
      QueryCriteria::Ids(ids) => {
        let placeholders = (1..=ids.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
        (format!("WHERE id IN ({placeholders})"), ids.iter().copied().map(Value::Integer).collect())
      },
      QueryCriteria::Section(id) => ("WHERE section_id = ?1".into(), vec![Value::Integer(*id)]),
      QueryCriteria::Status(status) =>
        ("WHERE processing_status = ?1".into(), vec![Value::Text(status.as_str().into())]),
      QueryCriteria::Intent(intent) =>
        ("WHERE intent = ?1".into(), vec![Value::Text(intent.as_str().into())]),
      QueryCriteria::Linked => ("WHERE item_key IS NOT NULL".into(), Vec::new()),
      QueryCriteria::All => (String::new(), Vec::new()),
    }
  }

  /// The complete statement.
  fn build_sql(&self) -> (String, Vec<Value>) {
    let (criteria, params) = self.build_criteria_sql();
    let mut sql = format!("SELECT {REFERENCE_COLUMNS} FROM reference_records {criteria} ORDER BY id");
    if let Some(limit) = self.limit {
      sql.push_str(&format!(" LIMIT {limit}"));
    }
    (sql, params)
  }
}

#[async_trait]
impl DatabaseInstruction for Query {
  type Output = Vec<Reference>;

  async fn execute(&self, db: &Database) -> Result<Self::Output> {
    if matches!(&self.criteria, QueryCriteria::Ids(ids) if ids.is_empty()) {
      return Ok(Vec::new());
    }
    let (sql, params) = self.build_sql();
    trace!(%sql, "Running query");

    let records = db
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(&sql)?;
        let records = stmt
          .query_map(params_from_iter(params), reference_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
      })
      .await?;
    Ok(records)
  }
}
