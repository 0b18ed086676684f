use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
  },
  time::Duration,
};

use async_trait::async_trait;
use reftrack::{
  batch::{BatchConfig, BatchSession, SessionStatus},
  database::{Query, Update},
  error::ReftrackError,
  guard::{detect_issues, IssueCode},
  prelude::*,
  reference::{ItemKey, ProcessingStatus, Reference, StoreStatus, UserIntent},
  repair::RepairOutcome,
  store::ItemMetadata,
  Config, Reftrack,
};
use tempfile::{tempdir, TempDir};
use tokio_test::{assert_err, assert_ok};
use tracing_test::traced_test;

mod workflows;

pub type TestResult<T> = anyhow::Result<T>;

/// In-memory item store standing in for the reference manager.
#[derive(Default)]
pub struct MemoryItemStore {
  /// Stored items by key
  items:       Mutex<HashMap<ItemKey, ItemMetadata>>,
  /// Every delete request, successful or not
  deletes:     Mutex<Vec<ItemKey>>,
  /// URLs whose creation fails
  failing:     Mutex<Vec<String>>,
  /// Fail every delete
  fail_delete: AtomicBool,
  /// Artificial latency per call
  delay:       Duration,
}

impl MemoryItemStore {
  pub fn with_delay(delay: Duration) -> Self { Self { delay, ..Self::default() } }

  pub fn fail_url(&self, url: &str) { self.failing.lock().unwrap().push(url.to_string()); }

  pub fn clear_failures(&self) { self.failing.lock().unwrap().clear(); }

  pub fn fail_deletes(&self, fail: bool) { self.fail_delete.store(fail, Ordering::SeqCst); }

  pub fn insert(&self, key: &str, url: &str) {
    let metadata = metadata(ItemKey::new(key), url);
    self.items.lock().unwrap().insert(metadata.key.clone(), metadata);
  }

  pub fn contains(&self, key: &str) -> bool {
    self.items.lock().unwrap().contains_key(&ItemKey::new(key))
  }

  pub fn len(&self) -> usize { self.items.lock().unwrap().len() }

  pub fn deletes(&self) -> Vec<ItemKey> { self.deletes.lock().unwrap().clone() }
}

fn metadata(key: ItemKey, url: &str) -> ItemMetadata {
  ItemMetadata {
    key,
    title: Some("A Study of Things".into()),
    url: Some(url.to_string()),
    date: Some("2021-03-04".into()),
    citation: Some("(Doe, 2021)".into()),
    item_type: Some("webpage".into()),
    extra: Default::default(),
  }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
  async fn create_item(&self, url: &str) -> reftrack::error::Result<ItemKey> {
    tokio::time::sleep(self.delay).await;
    if self.failing.lock().unwrap().iter().any(|u| u == url) {
      return Err(ReftrackError::ExternalService("HTTP 500: translation failed".into()));
    }
    let mut items = self.items.lock().unwrap();
    let key = ItemKey::new(format!("ITEM{:04}", items.len() + 1));
    items.insert(key.clone(), metadata(key.clone(), url));
    Ok(key)
  }

  async fn delete_item(&self, key: &ItemKey) -> reftrack::error::Result<()> {
    self.deletes.lock().unwrap().push(key.clone());
    if self.fail_delete.load(Ordering::SeqCst) {
      return Err(ReftrackError::ExternalService(
        "Connection error - is the service running?".into(),
      ));
    }
    match self.items.lock().unwrap().remove(key) {
      Some(_) => Ok(()),
      None => Err(ReftrackError::ExternalService("Item not found (404)".into())),
    }
  }

  async fn get_item_metadata(&self, key: &ItemKey) -> reftrack::error::Result<ItemMetadata> {
    self
      .items
      .lock()
      .unwrap()
      .get(key)
      .cloned()
      .ok_or_else(|| ReftrackError::ExternalService("Item not found (404)".into()))
  }
}

/// A reftrack instance over a temporary database and an in-memory store.
pub async fn create_test_reftrack(store: MemoryItemStore) -> (Reftrack, Arc<MemoryItemStore>, TempDir) {
  let dir = tempdir().unwrap();
  let mut config = Config::default().with_database_path(&dir.path().join("data").join("refs.db"));
  config.batch.poll_interval_ms = 20;
  let store = Arc::new(store);
  let reftrack = Reftrack::with_item_store(config, store.clone()).await.unwrap();
  (reftrack, store, dir)
}

/// Adds `count` URLs to a fresh section and returns their ids.
pub async fn add_references(reftrack: &Reftrack, count: usize) -> Vec<i64> {
  let section = reftrack.database.ensure_section("literature").await.unwrap();
  let mut ids = Vec::with_capacity(count);
  for i in 1..=count {
    let record =
      reftrack.add_reference(section, &format!("https://example.org/paper/{i}")).await.unwrap();
    ids.push(record.id);
  }
  ids
}

/// Forces a record into an arbitrary (possibly inconsistent) state.
pub async fn force_state(
  reftrack: &Reftrack,
  id: i64,
  processing: ProcessingStatus,
  store: Option<StoreStatus>,
  key: Option<&str>,
) -> Reference {
  Update::new(id)
    .processing_status(processing)
    .store_status(store)
    .item_key(key.map(ItemKey::new))
    .execute(&reftrack.database)
    .await
    .unwrap()
}
