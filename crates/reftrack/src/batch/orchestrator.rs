//! Session registry and background runner.

use std::{
  panic::AssertUnwindSafe,
  sync::{Mutex, MutexGuard, PoisonError, RwLock},
  time::Instant,
};

use futures::FutureExt;
use tokio::{
  sync::{watch, Semaphore},
  task::{JoinHandle, JoinSet},
};

use super::*;
use crate::pipeline::{ItemOutcome, ItemPipeline};

/// A registered session and the channel announcing its status changes.
struct SessionHandle {
  /// The session itself; every mutation happens under this lock
  state:     Mutex<BatchSession>,
  /// Latest status, for runners waiting out a pause
  status_tx: watch::Sender<SessionStatus>,
}

impl SessionHandle {
  /// Wraps a new session.
  fn new(session: BatchSession) -> Self {
    let (status_tx, _) = watch::channel(session.status);
    Self { state: Mutex::new(session), status_tx }
  }

  /// Locks the session, ignoring poisoning.
  fn lock(&self) -> MutexGuard<'_, BatchSession> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// A copy of the current state.
  fn snapshot(&self) -> BatchSession { self.lock().clone() }

  /// Applies `f` atomically and publishes the resulting status.
  fn update<T>(&self, f: impl FnOnce(&mut BatchSession) -> T) -> T {
    let mut session = self.lock();
    let out = f(&mut session);
    self.status_tx.send_replace(session.status);
    out
  }
}

/// Shared map of live sessions.
type Registry = Arc<RwLock<HashMap<SessionId, Arc<SessionHandle>>>>;

/// Creates, runs and tracks batch sessions.
///
/// Cloning is cheap; clones share the registry and the pipeline. Starting a session needs a
/// running tokio runtime.
#[derive(Clone)]
pub struct Orchestrator {
  /// Work done per item
  pipeline:  Arc<dyn ItemPipeline>,
  /// Live sessions by id
  sessions:  Registry,
  /// How long terminal sessions are kept
  retention: Duration,
}

impl Orchestrator {
  /// An orchestrator running items through `pipeline`, with the default retention.
  pub fn new(pipeline: Arc<dyn ItemPipeline>) -> Self {
    Self { pipeline, sessions: Registry::default(), retention: DEFAULT_RETENTION }
  }

  /// Keeps terminal sessions for `retention` before sweeping them.
  pub fn with_retention(mut self, retention: Duration) -> Self {
    self.retention = retention;
    self
  }

  /// Registers a session over `record_ids` and starts it in the background.
  ///
  /// Returns the initial snapshot (`running`, nothing processed) without waiting for any item.
  pub fn create_and_start(&self, record_ids: Vec<i64>, config: BatchConfig) -> Result<BatchSession> {
    config.validate()?;
    let session = BatchSession::new(SessionId::generate(), record_ids, config);
    let snapshot = session.clone();
    let handle = Arc::new(SessionHandle::new(session));

    self.write_sessions().insert(snapshot.id.clone(), Arc::clone(&handle));
    info!(
      session = %snapshot.id,
      items = snapshot.requested,
      concurrency = snapshot.config.concurrency,
      "Starting batch"
    );
    tokio::spawn(run_session(Arc::clone(&self.pipeline), handle));
    Ok(snapshot)
  }

  /// A consistent snapshot of a session.
  pub fn get_status(&self, id: &SessionId) -> Result<BatchSession> {
    Ok(self.handle(id)?.snapshot())
  }

  /// Stops launching new items until [`Orchestrator::resume`].
  pub fn pause(&self, id: &SessionId) -> Result<BatchSession> {
    self.transition(id, "Paused batch", BatchSession::pause)
  }

  /// Lets a paused session launch items again.
  pub fn resume(&self, id: &SessionId) -> Result<BatchSession> {
    self.transition(id, "Resumed batch", BatchSession::resume)
  }

  /// Cancels a session. Items already in flight finish but are not recorded.
  pub fn cancel(&self, id: &SessionId) -> Result<BatchSession> {
    self.transition(id, "Cancelled batch", BatchSession::cancel)
  }

  /// Snapshots of every registered session, oldest first.
  pub fn list_sessions(&self) -> Vec<BatchSession> {
    let mut sessions: Vec<_> =
      self.read_sessions().values().map(|handle| handle.snapshot()).collect();
    sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
    sessions
  }

  /// Drops terminal sessions that finished more than the retention window before `now`.
  ///
  /// Returns how many were removed.
  pub fn sweep(&self, now: DateTime<Utc>) -> usize {
    let mut sessions = self.write_sessions();
    let before = sessions.len();
    sessions.retain(|_, handle| !handle.lock().is_expired(now, self.retention));
    let removed = before - sessions.len();
    if removed > 0 {
      debug!(removed, "Swept expired batch sessions");
    }
    removed
  }

  /// Runs [`Orchestrator::sweep`] every `interval` until the returned task is aborted.
  pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
    let orchestrator = self.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
      loop {
        ticker.tick().await;
        orchestrator.sweep(Utc::now());
      }
    })
  }

  /// Applies a status transition to a registered session.
  fn transition(
    &self,
    id: &SessionId,
    message: &'static str,
    apply: fn(&mut BatchSession) -> Result<()>,
  ) -> Result<BatchSession> {
    let handle = self.handle(id)?;
    let snapshot = handle.update(|session| apply(session).map(|()| session.clone()))?;
    info!(session = %id, status = %snapshot.status, "{message}");
    Ok(snapshot)
  }

  /// Looks a session up.
  fn handle(&self, id: &SessionId) -> Result<Arc<SessionHandle>> {
    self
      .read_sessions()
      .get(id)
      .cloned()
      .ok_or_else(|| ReftrackError::SessionNotFound(id.to_string()))
  }

  /// Read access to the registry.
  fn read_sessions(&self) -> std::sync::RwLockReadGuard<'_, HashMap<SessionId, Arc<SessionHandle>>> {
    self.sessions.read().unwrap_or_else(PoisonError::into_inner)
  }

  /// Write access to the registry.
  fn write_sessions(
    &self,
  ) -> std::sync::RwLockWriteGuard<'_, HashMap<SessionId, Arc<SessionHandle>>> {
    self.sessions.write().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Waits while the session is paused, returning the first status that isn't `paused`.
async fn wait_while_paused(status_rx: &mut watch::Receiver<SessionStatus>) -> SessionStatus {
  loop {
    let status = *status_rx.borrow_and_update();
    if status != SessionStatus::Paused || status_rx.changed().await.is_err() {
      return status;
    }
  }
}

/// Splits `record_ids` by user intent, keeping records whose intent can't be read.
async fn filter_by_intent(
  pipeline: &dyn ItemPipeline,
  session: &SessionId,
  record_ids: Vec<i64>,
) -> (Vec<i64>, Vec<i64>) {
  let mut keep = Vec::with_capacity(record_ids.len());
  let mut skipped = Vec::new();
  for record_id in record_ids {
    match pipeline.user_intent(record_id).await {
      Ok(Some(UserIntent::Skip)) => skipped.push(record_id),
      Ok(_) => keep.push(record_id),
      Err(e) => {
        warn!(%session, id = record_id, error = %e, "Could not read intent; processing anyway");
        keep.push(record_id);
      },
    }
  }
  (keep, skipped)
}

/// Drives one session to a terminal status.
async fn run_session(pipeline: Arc<dyn ItemPipeline>, handle: Arc<SessionHandle>) {
  let (id, mut record_ids, config) = {
    let session = handle.lock();
    (session.id.clone(), session.record_ids.clone(), session.config.clone())
  };
  let mut status_rx = handle.status_tx.subscribe();

  if config.respect_user_intent {
    let (keep, skipped) = filter_by_intent(pipeline.as_ref(), &id, record_ids).await;
    if handle.update(|session| session.apply_filter(&skipped)) {
      debug!(session = %id, skipped = skipped.len(), "Skipped records by intent");
    }
    record_ids = keep;
  }

  let semaphore = Arc::new(Semaphore::new(config.concurrency));
  let mut tasks = JoinSet::new();
  for record_id in record_ids {
    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
      break;
    };
    if wait_while_paused(&mut status_rx).await.is_terminal() {
      break;
    }

    let pipeline = Arc::clone(&pipeline);
    let handle = Arc::clone(&handle);
    let session = id.clone();
    tasks.spawn(async move {
      let _permit = permit;
      let started = Instant::now();
      let outcome = AssertUnwindSafe(pipeline.process(record_id))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| ItemOutcome::failed("Pipeline panicked", started.elapsed()));

      let recorded = handle.update(|s| s.record_result(record_id, &outcome));
      match (recorded, &outcome.error) {
        (false, _) => debug!(%session, id = record_id, "Session already terminal; result dropped"),
        (true, None) => trace!(%session, id = record_id, "Item stored"),
        (true, Some(error)) => warn!(%session, id = record_id, %error, "Item failed"),
      }
    });

    while tasks.try_join_next().is_some() {}
  }
  while tasks.join_next().await.is_some() {}

  // A session paused after its last launch completes only once resumed.
  wait_while_paused(&mut status_rx).await;
  let snapshot = handle.update(|session| {
    session.finish();
    session.clone()
  });
  info!(
    session = %id,
    status = %snapshot.status,
    completed = snapshot.completed.len(),
    failed = snapshot.failed.len(),
    skipped = snapshot.skipped.len(),
    "Batch finished"
  );
}
