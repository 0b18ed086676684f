//! Local SQLite storage for sections and reference records.
//!
//! The database holds the durable half of the system: every tracked URL, its two status fields,
//! its item key and its counters. Batch sessions are deliberately not stored here.
//!
//! Reads and writes go through [`DatabaseInstruction`] implementations:
//! - [`Add`]: track a new URL
//! - [`Query`]: look records up by id, section, status or intent
//! - [`Update`]: write field changes in one transaction, optionally guarded against concurrent
//!   changes
//!
//! # Examples
//!
//! ```no_run
//! use reftrack::{
//!   database::{Add, Database, Query, Update},
//!   prelude::*,
//!   reference::UserIntent,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::open("references.db").await?;
//! let section = db.ensure_section("chapter-2").await?;
//!
//! let record = Add::new(section, "https://example.org/report").execute(&db).await?;
//! Update::new(record.id).intent(UserIntent::Skip).execute(&db).await?;
//!
//! let skipped = Query::by_intent(UserIntent::Skip).execute(&db).await?;
//! assert_eq!(skipped.len(), 1);
//! # Ok(())
//! # }
//! ```

use std::sync::Mutex;

use rusqlite::{params, types::Type, OptionalExtension, Row};
use tokio::sync::OwnedMutexGuard;
use tokio_rusqlite::Connection;

use super::*;
use crate::citation::CitationValidation;

/// Read and write commands executed against a [`Database`].
pub mod instruction;
#[cfg(test)] mod tests;

pub use self::instruction::*;

/// Column list matching [`reference_from_row`].
pub(crate) const REFERENCE_COLUMNS: &str = "id, section_id, url, processing_status, item_key, \
                                            store_status, store_error, intent, attempts, \
                                            last_error, validation, created_at, updated_at";

/// A named group of references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
  /// Database id
  pub id:         i64,
  /// Unique name
  pub name:       String,
  /// When the section was created
  pub created_at: DateTime<Utc>,
}

/// Per-record async locks, so at most one pipeline run or repair touches a record at a time.
type RecordLocks = Arc<Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>>;

/// Handle for interacting with the reference database.
///
/// Cloning is cheap and clones share the connection and the per-record locks.
#[derive(Clone)]
pub struct Database {
  /// Async SQLite connection handle
  conn:  Connection,
  /// Locks handed out by [`Database::lock_record`]
  locks: RecordLocks,
}

impl Database {
  /// Opens an existing database or creates a new one at the specified path.
  ///
  /// The schema in `migrations/init.sql` is applied on every open; it only creates what is
  /// missing.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = Connection::open(path.as_ref()).await?;
    Self::init(conn).await
  }

  /// Opens a private in-memory database, mostly for tests and dry runs.
  pub async fn open_in_memory() -> Result<Self> { Self::init(Connection::open_in_memory().await?).await }

  /// Applies the schema to a fresh connection.
  async fn init(conn: Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(include_str!(concat!(
          env!("CARGO_MANIFEST_DIR"),
          "/migrations/init.sql"
        )))?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, locks: Arc::default() })
  }

  /// Returns the default path for the database file.
  ///
  /// - On Unix: `~/.local/share/reftrack/reftrack.db`
  /// - On macOS: `~/Library/Application Support/reftrack/reftrack.db`
  /// - On Windows: `%APPDATA%\reftrack\reftrack.db`
  /// - Fallback: `./reftrack/reftrack.db`
  pub fn default_path() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("reftrack").join("reftrack.db")
  }

  /// Returns the id of the section called `name`, creating it if needed.
  pub async fn ensure_section(&self, name: &str) -> Result<i64> {
    let name = name.trim().to_string();
    if name.is_empty() {
      return Err(ReftrackError::SectionNotFound(name));
    }
    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sections (name, created_at) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
          params![name, Utc::now()],
        )?;
        let id = conn.query_row("SELECT id FROM sections WHERE name = ?1", [&name], |row| {
          row.get::<_, i64>(0)
        })?;
        Ok(id)
      })
      .await?;
    Ok(id)
  }

  /// Looks up a section by name.
  pub async fn find_section(&self, name: &str) -> Result<Section> {
    let lookup = name.to_string();
    self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id, name, created_at FROM sections WHERE name = ?1",
              [&lookup],
              section_from_row,
            )
            .optional()?,
        )
      })
      .await?
      .ok_or_else(|| ReftrackError::SectionNotFound(name.to_string()))
  }

  /// All sections, by name.
  pub async fn sections(&self) -> Result<Vec<Section>> {
    let sections = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare_cached("SELECT id, name, created_at FROM sections ORDER BY name")?;
        let sections = stmt.query_map([], section_from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sections)
      })
      .await?;
    Ok(sections)
  }

  /// Fetches one record.
  pub async fn get(&self, id: i64) -> Result<Reference> {
    Query::by_id(id).execute(self).await?.pop().ok_or(ReftrackError::NotFound(id))
  }

  /// Waits for exclusive access to record `id`.
  ///
  /// The lock is advisory: it serializes pipeline runs and repairs within this process, while
  /// [`Update::guarded`] catches writers that don't take it.
  pub async fn lock_record(&self, id: i64) -> OwnedMutexGuard<()> {
    let lock = {
      let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
      locks.retain(|_, lock| Arc::strong_count(lock) > 1);
      Arc::clone(locks.entry(id).or_default())
    };
    trace!(id, "Waiting for record lock");
    lock.lock_owned().await
  }
}

/// Maps a `sections` row.
fn section_from_row(row: &Row<'_>) -> rusqlite::Result<Section> {
  Ok(Section { id: row.get(0)?, name: row.get(1)?, created_at: row.get(2)? })
}

/// Converts a parse failure into the error rusqlite expects from row mappers.
fn conversion_error(
  column: usize,
  error: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
  rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(error))
}

/// Maps a row selected with [`REFERENCE_COLUMNS`].
pub(crate) fn reference_from_row(row: &Row<'_>) -> rusqlite::Result<Reference> {
  let processing_status = ProcessingStatus::from_str(&row.get::<_, String>(3)?)
    .map_err(|e| conversion_error(3, e))?;
  let store_status = row
    .get::<_, Option<String>>(5)?
    .map(|s| StoreStatus::from_str(&s))
    .transpose()
    .map_err(|e| conversion_error(5, e))?;
  let intent =
    UserIntent::from_str(&row.get::<_, String>(7)?).map_err(|e| conversion_error(7, e))?;
  let validation = row
    .get::<_, Option<String>>(10)?
    .map(|s| serde_json::from_str::<CitationValidation>(&s))
    .transpose()
    .map_err(|e| conversion_error(10, e))?;

  Ok(Reference {
    id: row.get(0)?,
    section_id: row.get(1)?,
    url: row.get(2)?,
    processing_status,
    item_key: row.get::<_, Option<String>>(4)?.map(ItemKey::new),
    store_status,
    store_error: row.get(6)?,
    intent,
    attempts: row.get(8)?,
    last_error: row.get(9)?,
    validation,
    created_at: row.get(11)?,
    updated_at: row.get(12)?,
  })
}
