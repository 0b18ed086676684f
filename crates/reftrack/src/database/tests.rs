use super::*;
use crate::citation::CitationValidation;

/// Helper function to set up a test database with one section
async fn setup_test_db() -> (Database, i64, PathBuf, tempfile::TempDir) {
  let dir = tempdir().unwrap();
  let path = dir.path().join("test.db");
  let db = Database::open(&path).await.unwrap();
  let section = db.ensure_section("intro").await.unwrap();
  (db, section, path, dir)
}

/// Writes a linked, stored record the way a successful pipeline run leaves it.
async fn stored_record(db: &Database, section: i64, url: &str, key: &str) -> Reference {
  let record = Add::new(section, url).execute(db).await.unwrap();
  Update::new(record.id)
    .processing_status(ProcessingStatus::Stored)
    .store_status(Some(StoreStatus::Stored))
    .item_key(Some(ItemKey::new(key)))
    .execute(db)
    .await
    .unwrap()
}

#[traced_test]
#[tokio::test]
async fn test_database_creation() {
  let (_db, _section, path, _dir) = setup_test_db().await;

  // Check that file exists
  assert!(path.exists());
}

#[traced_test]
#[test]
fn test_default_path() {
  let path = Database::default_path();

  assert!(path.ends_with("reftrack/reftrack.db") || path.ends_with("reftrack\\reftrack.db"));
  assert!(path
    .parent()
    .unwrap()
    .starts_with(dirs::data_dir().unwrap_or_else(|| PathBuf::from("."))));
}

#[traced_test]
#[tokio::test]
async fn test_reopen_keeps_records() {
  let (db, section, path, _dir) = setup_test_db().await;
  let record = Add::new(section, "https://example.org/a").execute(&db).await.unwrap();
  drop(db);

  let db = Database::open(&path).await.unwrap();
  let loaded = db.get(record.id).await.unwrap();
  assert_eq!(loaded.url, "https://example.org/a");
  assert_eq!(loaded.processing_status, ProcessingStatus::NotStarted);
  assert_eq!(loaded.intent, UserIntent::Process);
}

#[traced_test]
#[tokio::test]
async fn test_sections() {
  let (db, section, _path, _dir) = setup_test_db().await;

  assert_eq!(db.ensure_section("intro").await.unwrap(), section);
  let other = db.ensure_section("  methods ").await.unwrap();
  assert_ne!(other, section);

  let names: Vec<_> = db.sections().await.unwrap().into_iter().map(|s| s.name).collect();
  assert_eq!(names, ["intro", "methods"]);
  assert_eq!(db.find_section("methods").await.unwrap().id, other);
  assert!(matches!(
    db.find_section("results").await,
    Err(ReftrackError::SectionNotFound(name)) if name == "results"
  ));
  assert!(db.ensure_section("   ").await.is_err());
}

#[traced_test]
#[tokio::test]
async fn test_add_rejects_duplicates_per_section() {
  let (db, section, _path, _dir) = setup_test_db().await;
  let other = db.ensure_section("methods").await.unwrap();

  Add::new(section, "https://example.org/a").execute(&db).await.unwrap();
  let duplicate = Add::new(section, "https://example.org/a").execute(&db).await;
  assert!(matches!(duplicate, Err(ReftrackError::DuplicateReference { .. })));

  // Same URL in another section is fine
  Add::new(other, "https://example.org/a").execute(&db).await.unwrap();
}

#[traced_test]
#[tokio::test]
async fn test_add_validates_input() {
  let (db, section, _path, _dir) = setup_test_db().await;

  let result = Add::new(section, "ftp://example.org/file").execute(&db).await;
  assert!(matches!(result, Err(ReftrackError::InvalidUrl(_))));

  let result = Add::new(section, "not a url").execute(&db).await;
  assert!(matches!(result, Err(ReftrackError::UrlParse(_))));

  let result = Add::new(section + 100, "https://example.org/a").execute(&db).await;
  assert!(matches!(result, Err(ReftrackError::SectionNotFound(_))));
}

#[traced_test]
#[tokio::test]
async fn test_query_criteria() {
  let (db, section, _path, _dir) = setup_test_db().await;
  let other = db.ensure_section("methods").await.unwrap();

  let a = Add::new(section, "https://example.org/a").execute(&db).await.unwrap();
  let b = stored_record(&db, section, "https://example.org/b", "KEYB").await;
  let c = Add::new(other, "https://example.org/c").execute(&db).await.unwrap();

  let ids = |records: Vec<Reference>| records.into_iter().map(|r| r.id).collect::<Vec<_>>();

  assert_eq!(ids(Query::by_section(section).execute(&db).await.unwrap()), [a.id, b.id]);
  assert_eq!(ids(Query::by_status(ProcessingStatus::Stored).execute(&db).await.unwrap()), [b.id]);
  assert_eq!(ids(Query::linked().execute(&db).await.unwrap()), [b.id]);
  assert_eq!(ids(Query::by_ids(vec![c.id, a.id]).execute(&db).await.unwrap()), [a.id, c.id]);
  assert_eq!(ids(Query::list_all().limit(2).execute(&db).await.unwrap()), [a.id, b.id]);
  assert!(Query::by_ids(Vec::new()).execute(&db).await.unwrap().is_empty());
  assert!(Query::by_id(9999).execute(&db).await.unwrap().is_empty());
}

#[traced_test]
#[tokio::test]
async fn test_update_writes_fields() {
  let (db, section, _path, _dir) = setup_test_db().await;
  let record = Add::new(section, "https://example.org/a").execute(&db).await.unwrap();

  let validation = CitationValidation::Incomplete { missing_fields: vec!["date".into()] };
  let updated = Update::new(record.id)
    .processing_status(ProcessingStatus::Failed)
    .store_status(Some(StoreStatus::Failed))
    .store_error(Some("HTTP 500".into()))
    .attempts(2)
    .last_error(Some("HTTP 500".into()))
    .validation(Some(validation.clone()))
    .execute(&db)
    .await
    .unwrap();

  assert_eq!(updated.processing_status, ProcessingStatus::Failed);
  assert_eq!(updated.store_status, Some(StoreStatus::Failed));
  assert_eq!(updated.attempts, 2);
  assert_eq!(updated.validation, Some(validation));
  assert!(updated.updated_at >= record.updated_at);
  assert_eq!(db.get(record.id).await.unwrap(), updated);

  // Clearing back to none
  let cleared = Update::new(record.id).store_status(None).validation(None).execute(&db).await.unwrap();
  assert_eq!(cleared.store_status, None);
  assert_eq!(cleared.validation, None);
  assert_eq!(cleared.store_error.as_deref(), Some("HTTP 500"));
}

#[traced_test]
#[tokio::test]
async fn test_guarded_update_detects_concurrent_change() {
  let (db, section, _path, _dir) = setup_test_db().await;
  let record = Add::new(section, "https://example.org/a").execute(&db).await.unwrap();

  // Someone else moves the record on after we read it
  Update::new(record.id).processing_status(ProcessingStatus::Processing).execute(&db).await.unwrap();

  let result = Update::new(record.id)
    .processing_status(ProcessingStatus::Stored)
    .guarded(&record)
    .execute(&db)
    .await;
  assert!(matches!(result, Err(ReftrackError::StaleRecord(id)) if id == record.id));
  assert_eq!(db.get(record.id).await.unwrap().processing_status, ProcessingStatus::Processing);

  // Guarding with the current state goes through, including NULL columns
  let current = db.get(record.id).await.unwrap();
  let updated = Update::new(record.id)
    .processing_status(ProcessingStatus::Failed)
    .guarded(&current)
    .execute(&db)
    .await
    .unwrap();
  assert_eq!(updated.processing_status, ProcessingStatus::Failed);
}

#[traced_test]
#[tokio::test]
async fn test_update_missing_record() {
  let (db, _section, _path, _dir) = setup_test_db().await;
  let result = Update::new(42).attempts(1).execute(&db).await;
  assert!(matches!(result, Err(ReftrackError::NotFound(42))));
  assert!(matches!(db.get(42).await, Err(ReftrackError::NotFound(42))));
}

#[traced_test]
#[tokio::test]
async fn test_unlink_update() {
  let (db, section, _path, _dir) = setup_test_db().await;
  let record = stored_record(&db, section, "https://example.org/a", "KEYA").await;

  let unlinked = Update::unlink(&record).execute(&db).await.unwrap();
  assert_eq!(unlinked.item_key, None);
  assert_eq!(unlinked.store_status, None);
  assert_eq!(unlinked.processing_status, ProcessingStatus::NotStarted);
}

#[traced_test]
#[tokio::test]
async fn test_set_intent() {
  let (db, section, _path, _dir) = setup_test_db().await;
  let record = Add::new(section, "https://example.org/a").execute(&db).await.unwrap();

  let skipped = SetIntent::new(record.id, UserIntent::Skip).execute(&db).await.unwrap();
  assert_eq!(skipped.intent, UserIntent::Skip);
  assert_eq!(skipped.processing_status, ProcessingStatus::NotStarted);
  assert_eq!(Query::by_intent(UserIntent::Skip).execute(&db).await.unwrap().len(), 1);

  let archived = SetIntent::new(record.id, UserIntent::Archive).execute(&db).await.unwrap();
  assert_eq!(archived.processing_status, ProcessingStatus::Archived);

  let revived = SetIntent::new(record.id, UserIntent::Process).execute(&db).await.unwrap();
  assert_eq!(revived.intent, UserIntent::Process);
  assert_eq!(revived.processing_status, ProcessingStatus::NotStarted);
}

#[traced_test]
#[tokio::test]
async fn test_record_lock_serializes_access() {
  let (db, _section, _path, _dir) = setup_test_db().await;

  let guard = db.lock_record(1).await;
  let blocked = tokio::time::timeout(Duration::from_millis(50), db.lock_record(1)).await;
  assert!(blocked.is_err());

  // Other records are independent
  let _other = db.lock_record(2).await;

  drop(guard);
  let _again = tokio::time::timeout(Duration::from_secs(1), db.lock_record(1)).await.unwrap();
}
