//! Tracking new URLs.

use super::*;

/// Instruction inserting a new record in `not_started` state.
///
/// The URL is validated first and must be unique within its section.
#[derive(Debug, Clone)]
pub struct Add {
  /// Owning section
  section_id: i64,
  /// URL to track
  url:        String,
}

impl Add {
  /// Tracks `url` in the section `section_id`.
  pub fn new(section_id: i64, url: impl Into<String>) -> Self {
    Self { section_id, url: url.into() }
  }
}

#[async_trait]
impl DatabaseInstruction for Add {
  type Output = Reference;

  async fn execute(&self, db: &Database) -> Result<Self::Output> {
    let url = validate_url(&self.url)?.to_string();
    let record = Reference::new(self.section_id, url.clone());
    let section_id = self.section_id;

    let inserted = db
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let section_exists = tx
          .query_row("SELECT 1 FROM sections WHERE id = ?1", [section_id], |_| Ok(()))
          .optional()?
          .is_some();
        if !section_exists {
          return Ok(Err(ReftrackError::SectionNotFound(section_id.to_string())));
        }

        let id = {
          let mut stmt = tx.prepare_cached(
            "INSERT INTO reference_records (
                section_id, url, processing_status, intent, attempts, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)
             ON CONFLICT(section_id, url) DO NOTHING
             RETURNING id",
          )?;
          stmt
            .query_row(
              params![
                record.section_id,
                record.url,
                record.processing_status.as_str(),
                record.intent.as_str(),
                record.created_at,
                record.updated_at,
              ],
              |row| row.get::<_, i64>(0),
            )
            .optional()?
        };

        tx.commit()?;
        Ok(Ok(id.map(|id| Reference { id, ..record })))
      })
      .await??;

    match inserted {
      Some(record) => {
        debug!(id = record.id, section_id, url = %record.url, "Tracked reference");
        Ok(record)
      },
      None => Err(ReftrackError::DuplicateReference { section_id, url }),
    }
  }
}
