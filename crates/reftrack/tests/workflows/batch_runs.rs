use super::*;

/// Runs a batch and polls it to the end.
async fn run(reftrack: &Reftrack, ids: Vec<i64>, config: BatchConfig) -> TestResult<BatchSession> {
  let session = reftrack.orchestrator.create_and_start(ids, config)?;
  Ok(tokio::time::timeout(Duration::from_secs(10), reftrack.wait_for(&session.id, |_| {})).await?)
}

#[traced_test]
#[tokio::test]
async fn test_batch_stores_every_record() -> TestResult<()> {
  let (reftrack, store, _dir) =
    create_test_reftrack(MemoryItemStore::with_delay(Duration::from_millis(10))).await;
  let ids = add_references(&reftrack, 3).await;

  let mut snapshots = Vec::new();
  let session = reftrack.orchestrator.create_and_start(ids.clone(), BatchConfig::default())?;
  assert_eq!(session.status, SessionStatus::Running);
  let done = reftrack.wait_for(&session.id, |s| snapshots.push(s.current_index)).await;

  assert_eq!(done.status, SessionStatus::Completed);
  assert_eq!(done.current_index, 3);
  assert!(done.failed.is_empty());
  let mut completed = done.completed.clone();
  completed.sort_unstable();
  assert_eq!(completed, ids);
  assert!(snapshots.windows(2).all(|w| w[0] <= w[1]), "{snapshots:?}");

  for record in Query::by_ids(ids).execute(&reftrack.database).await? {
    assert_eq!(record.processing_status, ProcessingStatus::Stored);
    assert_eq!(record.store_status, Some(StoreStatus::Stored));
    assert!(record.validation.as_ref().is_some_and(|v| v.is_valid()));
    assert!(detect_issues(&record).is_empty());
  }
  assert_eq!(store.len(), 3);
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_stop_on_error_leaves_rest_untouched() -> TestResult<()> {
  let (reftrack, store, _dir) = create_test_reftrack(MemoryItemStore::default()).await;
  let ids = add_references(&reftrack, 3).await;
  store.fail_url("https://example.org/paper/2");

  let config = BatchConfig::default().with_concurrency(1).with_stop_on_error(true);
  let done = run(&reftrack, ids.clone(), config).await?;

  assert_eq!(done.status, SessionStatus::Cancelled);
  assert_eq!(done.completed, [ids[0]]);
  assert_eq!(done.failed, [ids[1]]);
  assert_eq!(done.current_index, 2);
  let error = done.results[1].error.as_deref().unwrap_or_default();
  assert!(error.contains("translation failed"), "{error}");

  let failed = reftrack.database.get(ids[1]).await?;
  assert_eq!(failed.processing_status, ProcessingStatus::Failed);
  assert_eq!(failed.attempts, 1);
  let untouched = reftrack.database.get(ids[2]).await?;
  assert_eq!(untouched.processing_status, ProcessingStatus::NotStarted);
  assert_eq!(untouched.attempts, 0);
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_failures_without_stop_on_error() -> TestResult<()> {
  let (reftrack, store, _dir) = create_test_reftrack(MemoryItemStore::default()).await;
  let ids = add_references(&reftrack, 4).await;
  store.fail_url("https://example.org/paper/1");
  store.fail_url("https://example.org/paper/3");

  let done = run(&reftrack, ids.clone(), BatchConfig::default().with_concurrency(2)).await?;

  assert_eq!(done.status, SessionStatus::Completed);
  assert_eq!(done.current_index, done.completed.len() + done.failed.len());
  let mut failed = done.failed.clone();
  failed.sort_unstable();
  assert_eq!(failed, [ids[0], ids[2]]);

  // A second run retries only what failed
  store.clear_failures();
  let retry = run(&reftrack, failed.clone(), BatchConfig::default()).await?;
  assert_eq!(retry.completed.len(), 2);
  assert_eq!(reftrack.database.get(ids[0]).await?.attempts, 2);
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_respects_skip_intent() -> TestResult<()> {
  use reftrack::database::SetIntent;

  let (reftrack, _store, _dir) = create_test_reftrack(MemoryItemStore::default()).await;
  let ids = add_references(&reftrack, 3).await;
  SetIntent::new(ids[1], UserIntent::Skip).execute(&reftrack.database).await?;

  let config = BatchConfig::default().with_respect_user_intent(true);
  let done = run(&reftrack, ids.clone(), config).await?;

  assert_eq!(done.status, SessionStatus::Completed);
  assert_eq!(done.requested, 3);
  assert_eq!(done.skipped, [ids[1]]);
  assert_eq!(done.current_index, 2);
  assert_eq!(reftrack.database.get(ids[1]).await?.processing_status, ProcessingStatus::NotStarted);

  // Without the flag the skipped record is processed too
  let done = run(&reftrack, vec![ids[1]], BatchConfig::default()).await?;
  assert_eq!(done.completed, [ids[1]]);
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_inconsistent_and_unknown_records_fail() -> TestResult<()> {
  let (reftrack, _store, _dir) = create_test_reftrack(MemoryItemStore::default()).await;
  let ids = add_references(&reftrack, 1).await;
  force_state(&reftrack, ids[0], ProcessingStatus::NotStarted, None, Some("GHOST")).await;

  let done = run(&reftrack, vec![ids[0], 9999], BatchConfig::default()).await?;
  assert_eq!(done.status, SessionStatus::Completed);
  assert_eq!(done.failed.len(), 2);
  let errors: Vec<_> = done.results.iter().filter_map(|r| r.error.clone()).collect();
  assert!(errors.iter().any(|e| e.contains("repair it first")), "{errors:?}");
  assert!(errors.iter().any(|e| e.contains("9999")), "{errors:?}");

  // Repair, then the record goes through
  reftrack.repairer.repair(ids[0]).await?;
  let done = run(&reftrack, vec![ids[0]], BatchConfig::default()).await?;
  assert_eq!(done.completed, [ids[0]]);
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_pause_and_resume_through_reftrack() -> TestResult<()> {
  let (reftrack, _store, _dir) =
    create_test_reftrack(MemoryItemStore::with_delay(Duration::from_millis(20))).await;
  let ids = add_references(&reftrack, 4).await;

  let session = reftrack
    .orchestrator
    .create_and_start(ids.clone(), BatchConfig::default().with_concurrency(1))?;
  reftrack.orchestrator.pause(&session.id)?;
  tokio::time::sleep(Duration::from_millis(60)).await;
  assert_eq!(reftrack.orchestrator.get_status(&session.id)?.status, SessionStatus::Paused);

  reftrack.orchestrator.resume(&session.id)?;
  let done = reftrack.wait_for(&session.id, |_| {}).await;
  assert_eq!(done.status, SessionStatus::Completed);
  assert_eq!(done.completed.len(), 4);
  assert_eq!(reftrack.orchestrator.list_sessions().len(), 1);
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_finished_sessions_are_swept_in_background() -> TestResult<()> {
  let dir = tempdir()?;
  let mut config = Config::default().with_database_path(&dir.path().join("refs.db"));
  config.batch.retention_secs = 0;
  config.batch.sweep_interval_secs = 1;
  let reftrack = Reftrack::with_item_store(config, Arc::new(MemoryItemStore::default())).await?;

  let session = reftrack.orchestrator.create_and_start(Vec::new(), BatchConfig::default())?;
  assert_eq!(reftrack.orchestrator.list_sessions().len(), 1);

  tokio::time::timeout(Duration::from_secs(5), async {
    while !reftrack.orchestrator.list_sessions().is_empty() {
      tokio::time::sleep(Duration::from_millis(50)).await;
    }
  })
  .await?;
  assert_err!(reftrack.orchestrator.get_status(&session.id));
  Ok(())
}
