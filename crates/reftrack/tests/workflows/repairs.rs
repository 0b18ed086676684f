use super::*;

/// Archived records that still hold an external item
mod archived_with_item {
  use super::*;

  #[traced_test]
  #[tokio::test]
  async fn test_repair_deletes_item_then_unlinks() -> TestResult<()> {
    let (reftrack, store, _dir) = create_test_reftrack(MemoryItemStore::default()).await;
    let id = add_references(&reftrack, 1).await[0];
    store.insert("ABC123", "https://example.org/paper/1");
    force_state(&reftrack, id, ProcessingStatus::Archived, Some(StoreStatus::Stored), Some("ABC123"))
      .await;

    let diagnosis = reftrack.repairer.diagnose(id).await?;
    assert_eq!(diagnosis.issues, [IssueCode::ItemExistsWrongState]);
    let plan = diagnosis.plan.expect("a plan");
    assert_eq!(plan.delete_item, Some(ItemKey::new("ABC123")));

    let outcome = reftrack.repairer.repair(id).await?;
    assert!(matches!(outcome, RepairOutcome::Repaired { plan: applied } if applied == plan));

    let record = reftrack.database.get(id).await?;
    assert_eq!(record.item_key, None);
    assert_eq!(record.store_status, None);
    assert_eq!(record.processing_status, ProcessingStatus::Archived);
    assert!(detect_issues(&record).is_empty());
    assert_eq!(store.deletes(), [ItemKey::new("ABC123")]);
    assert!(!store.contains("ABC123"));
    Ok(())
  }

  #[traced_test]
  #[tokio::test]
  async fn test_failed_delete_leaves_record_untouched() -> TestResult<()> {
    let (reftrack, store, _dir) = create_test_reftrack(MemoryItemStore::default()).await;
    let id = add_references(&reftrack, 1).await[0];
    store.insert("ABC123", "https://example.org/paper/1");
    let before = force_state(
      &reftrack,
      id,
      ProcessingStatus::Archived,
      Some(StoreStatus::Stored),
      Some("ABC123"),
    )
    .await;
    store.fail_deletes(true);

    let err = assert_err!(reftrack.repairer.repair(id).await);
    assert!(matches!(err, ReftrackError::ExternalService(_)));
    assert!(err.is_transient());

    let after = reftrack.database.get(id).await?;
    assert_eq!(after, before);
    assert_eq!(after.item_key, Some(ItemKey::new("ABC123")));
    assert!(store.contains("ABC123"));

    // Once the service is back the same repair goes through
    store.fail_deletes(false);
    assert_ok!(reftrack.repairer.repair(id).await);
    assert!(!reftrack.database.get(id).await?.is_linked());
    Ok(())
  }
}

/// Repairs that only touch local fields
mod local_repairs {
  use super::*;

  #[traced_test]
  #[tokio::test]
  async fn test_repair_is_idempotent() -> TestResult<()> {
    let (reftrack, _store, _dir) = create_test_reftrack(MemoryItemStore::default()).await;
    let id = add_references(&reftrack, 1).await[0];
    force_state(&reftrack, id, ProcessingStatus::Stored, Some(StoreStatus::Stored), None).await;

    let first = reftrack.repairer.repair(id).await?;
    assert!(matches!(first, RepairOutcome::Repaired { .. }));
    let repaired = reftrack.database.get(id).await?;

    assert_eq!(reftrack.repairer.repair(id).await?, RepairOutcome::NoIssueFound);
    assert_eq!(reftrack.database.get(id).await?, repaired);
    Ok(())
  }

  #[traced_test]
  #[tokio::test]
  async fn test_stored_without_item_goes_back_to_not_started() -> TestResult<()> {
    let (reftrack, store, _dir) = create_test_reftrack(MemoryItemStore::default()).await;
    let id = add_references(&reftrack, 1).await[0];
    force_state(&reftrack, id, ProcessingStatus::Stored, Some(StoreStatus::Stored), None).await;

    let diagnosis = reftrack.repairer.diagnose(id).await?;
    assert_eq!(diagnosis.issues, [IssueCode::StoredButNoItem]);
    // Clearing the store status exposes the processing mismatch, which the same plan fixes
    assert_eq!(diagnosis.plan.expect("a plan").changes.len(), 2);

    reftrack.repairer.repair(id).await?;
    let record = reftrack.database.get(id).await?;
    assert_eq!(record.store_status, None);
    assert_eq!(record.processing_status, ProcessingStatus::NotStarted);
    assert!(store.deletes().is_empty());
    Ok(())
  }

  #[traced_test]
  #[tokio::test]
  async fn test_failed_processing_follows_stored_item() -> TestResult<()> {
    let (reftrack, _store, _dir) = create_test_reftrack(MemoryItemStore::default()).await;
    let id = add_references(&reftrack, 1).await[0];
    force_state(&reftrack, id, ProcessingStatus::Failed, Some(StoreStatus::Stored), Some("K1"))
      .await;

    assert_eq!(reftrack.repairer.diagnose(id).await?.issues, [IssueCode::DualStateMismatch]);
    reftrack.repairer.repair(id).await?;
    let record = reftrack.database.get(id).await?;
    assert_eq!(record.processing_status, ProcessingStatus::Stored);
    assert_eq!(record.item_key, Some(ItemKey::new("K1")));
    Ok(())
  }

  #[traced_test]
  #[tokio::test]
  async fn test_every_record_in_a_section_can_be_repaired() -> TestResult<()> {
    let (reftrack, store, _dir) = create_test_reftrack(MemoryItemStore::default()).await;
    let ids = add_references(&reftrack, 4).await;
    store.insert("K3", "https://example.org/paper/3");
    force_state(&reftrack, ids[0], ProcessingStatus::NotStarted, None, Some("K1")).await;
    force_state(&reftrack, ids[1], ProcessingStatus::Failed, Some(StoreStatus::Stored), None).await;
    force_state(&reftrack, ids[2], ProcessingStatus::Ignored, Some(StoreStatus::Failed), Some("K3"))
      .await;

    for id in &ids {
      reftrack.repairer.repair(*id).await?;
    }
    for record in Query::list_all().execute(&reftrack.database).await? {
      assert!(detect_issues(&record).is_empty(), "{record:?}");
    }
    assert_eq!(store.deletes(), [ItemKey::new("K3")]);
    Ok(())
  }
}

/// Explicit unlink and delete actions
mod linkage_actions {
  use super::*;

  #[traced_test]
  #[tokio::test]
  async fn test_delete_after_pipeline_run() -> TestResult<()> {
    let (reftrack, store, _dir) = create_test_reftrack(MemoryItemStore::default()).await;
    let ids = add_references(&reftrack, 1).await;
    let session = reftrack.orchestrator.create_and_start(ids.clone(), BatchConfig::default())?;
    reftrack.wait_for(&session.id, |_| {}).await;

    let stored = reftrack.database.get(ids[0]).await?;
    let key = stored.item_key.clone().expect("stored record has a key");
    assert!(store.contains(key.as_str()));

    let deleted = reftrack.repairer.delete(ids[0]).await?;
    assert!(!deleted.is_linked());
    assert_eq!(deleted.processing_status, ProcessingStatus::NotStarted);
    assert!(!store.contains(key.as_str()));
    Ok(())
  }

  #[traced_test]
  #[tokio::test]
  async fn test_archive_intent_on_linked_record_needs_repair() -> TestResult<()> {
    use reftrack::database::SetIntent;

    let (reftrack, store, _dir) = create_test_reftrack(MemoryItemStore::default()).await;
    let id = add_references(&reftrack, 1).await[0];
    store.insert("K1", "https://example.org/paper/1");
    force_state(&reftrack, id, ProcessingStatus::Stored, Some(StoreStatus::Stored), Some("K1"))
      .await;

    let archived = SetIntent::new(id, UserIntent::Archive).execute(&reftrack.database).await?;
    assert_eq!(detect_issues(&archived), [IssueCode::ItemExistsWrongState]);

    reftrack.repairer.repair(id).await?;
    assert!(!store.contains("K1"));
    assert!(detect_issues(&reftrack.database.get(id).await?).is_empty());
    Ok(())
  }
}
