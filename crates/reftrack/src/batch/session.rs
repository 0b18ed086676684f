//! The batch session aggregate and its state machine.

use uuid::Uuid;

use super::*;
use crate::pipeline::ItemOutcome;

/// Identifier of a batch session, `batch_<unix millis>_<8 hex chars>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
  /// A fresh id for a session started now.
  pub fn generate() -> Self {
    let random = Uuid::new_v4().simple().to_string();
    Self(format!("batch_{}_{}", Utc::now().timestamp_millis(), &random[..8]))
  }

  /// The id as text.
  pub fn as_str(&self) -> &str { &self.0 }
}

impl Display for SessionId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for SessionId {
  fn from(id: &str) -> Self { Self(id.to_string()) }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
  /// Items are being launched.
  #[default]
  Running,
  /// No new items launch until resumed.
  Paused,
  /// Every item produced a result.
  Completed,
  /// Stopped by the operator or by stop-on-error.
  Cancelled,
}

impl SessionStatus {
  /// The lowercase name used in storage and output.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Running => "running",
      Self::Paused => "paused",
      Self::Completed => "completed",
      Self::Cancelled => "cancelled",
    }
  }

  /// Terminal statuses are never left.
  pub fn is_terminal(&self) -> bool { matches!(self, Self::Completed | Self::Cancelled) }
}

impl Display for SessionStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// Options for one batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
  /// Move records whose intent is `skip` out of the run before it starts
  pub respect_user_intent: bool,
  /// Items in flight at once
  pub concurrency:         usize,
  /// Cancel the session on the first failed item
  pub stop_on_error:       bool,
}

impl Default for BatchConfig {
  fn default() -> Self {
    Self { respect_user_intent: false, concurrency: DEFAULT_CONCURRENCY, stop_on_error: false }
  }
}

impl BatchConfig {
  /// Items in flight at once; must be at least 1.
  pub fn with_concurrency(mut self, concurrency: usize) -> Self {
    self.concurrency = concurrency;
    self
  }

  /// Cancel the session at the first failed item.
  pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
    self.stop_on_error = stop_on_error;
    self
  }

  /// Leave out records whose intent is `skip`.
  pub fn with_respect_user_intent(mut self, respect: bool) -> Self {
    self.respect_user_intent = respect;
    self
  }

  /// Rejects settings a session cannot run with.
  pub fn validate(&self) -> Result<()> {
    if self.concurrency == 0 {
      return Err(ReftrackError::InvalidConfig("concurrency must be at least 1".into()));
    }
    Ok(())
  }
}

/// Outcome of one item, as recorded on the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
  /// The processed record
  pub record_id:   i64,
  /// Whether it was stored
  pub success:     bool,
  /// Key of the stored item
  pub item_key:    Option<ItemKey>,
  /// Why it failed
  pub error:       Option<String>,
  /// Time spent in the pipeline
  pub duration:    Duration,
  /// When the result was recorded
  pub finished_at: DateTime<Utc>,
}

/// One bulk run over a list of records.
///
/// All mutation goes through methods that uphold the session invariants:
/// - `current_index == completed.len() + failed.len()`, never decreasing and never above
///   `record_ids.len()`
/// - `completed` is only reached once every record produced a result
/// - a terminal session is never changed again
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSession {
  /// Session id
  pub id:                   SessionId,
  /// Records to process, in input order, after intent filtering
  pub record_ids:           Vec<i64>,
  /// How many records were requested, before filtering
  pub requested:            usize,
  /// Run options
  pub config:               BatchConfig,
  /// Items that produced a result
  pub current_index:        usize,
  /// Records stored successfully, in completion order
  pub completed:            Vec<i64>,
  /// Records that failed, in completion order
  pub failed:               Vec<i64>,
  /// Records left out because of their intent
  pub skipped:              Vec<i64>,
  /// Per-item results, in completion order
  pub results:              Vec<ItemResult>,
  /// Lifecycle status
  pub status:               SessionStatus,
  /// When the session was created
  pub started_at:           DateTime<Utc>,
  /// When the session became terminal
  pub completed_at:         Option<DateTime<Utc>>,
  /// Projected end, from the average item duration so far
  pub estimated_completion: Option<DateTime<Utc>>,
}

impl BatchSession {
  /// A running session with nothing processed yet.
  pub fn new(id: SessionId, record_ids: Vec<i64>, config: BatchConfig) -> Self {
    Self {
      id,
      requested: record_ids.len(),
      record_ids,
      config,
      current_index: 0,
      completed: Vec::new(),
      failed: Vec::new(),
      skipped: Vec::new(),
      results: Vec::new(),
      status: SessionStatus::Running,
      started_at: Utc::now(),
      completed_at: None,
      estimated_completion: None,
    }
  }

  /// Whether the session is `completed` or `cancelled`.
  pub fn is_terminal(&self) -> bool { self.status.is_terminal() }

  /// Records still waiting for a result.
  pub fn remaining(&self) -> usize { self.record_ids.len() - self.current_index }

  /// Fraction of records with a result, `1.0` for an empty session.
  pub fn progress(&self) -> f64 {
    if self.record_ids.is_empty() {
      1.0
    } else {
      self.current_index as f64 / self.record_ids.len() as f64
    }
  }

  /// An error for `action` attempted in the current status.
  fn invalid(&self, action: &'static str) -> ReftrackError {
    ReftrackError::InvalidTransition { action, from: self.status.to_string() }
  }

  /// `running -> paused`.
  pub fn pause(&mut self) -> Result<()> {
    match self.status {
      SessionStatus::Running => {
        self.status = SessionStatus::Paused;
        Ok(())
      },
      _ => Err(self.invalid("pause")),
    }
  }

  /// `paused -> running`.
  pub fn resume(&mut self) -> Result<()> {
    match self.status {
      SessionStatus::Paused => {
        self.status = SessionStatus::Running;
        Ok(())
      },
      _ => Err(self.invalid("resume")),
    }
  }

  /// `running | paused -> cancelled`.
  pub fn cancel(&mut self) -> Result<()> {
    match self.status {
      SessionStatus::Running | SessionStatus::Paused => {
        self.terminate(SessionStatus::Cancelled);
        Ok(())
      },
      _ => Err(self.invalid("cancel")),
    }
  }

  /// Moves `skipped` records out of the run. Only allowed before any item has a result.
  pub fn apply_filter(&mut self, skipped: &[i64]) -> bool {
    if self.is_terminal() || self.current_index > 0 || skipped.is_empty() {
      return false;
    }
    self.record_ids.retain(|id| !skipped.contains(id));
    self.skipped.extend_from_slice(skipped);
    true
  }

  /// Records one item's outcome.
  ///
  /// Returns `false`, changing nothing, if the session is already terminal. A failure under
  /// stop-on-error cancels the session after recording the result.
  pub fn record_result(&mut self, record_id: i64, outcome: &ItemOutcome) -> bool {
    if self.is_terminal() || self.remaining() == 0 {
      return false;
    }

    let now = Utc::now();
    self.results.push(ItemResult {
      record_id,
      success: outcome.success,
      item_key: outcome.item_key.clone(),
      error: outcome.error.clone(),
      duration: outcome.duration,
      finished_at: now,
    });
    if outcome.success {
      self.completed.push(record_id);
    } else {
      self.failed.push(record_id);
    }
    self.current_index += 1;
    self.estimated_completion =
      self.estimate_remaining().and_then(|remaining| now.checked_add_signed(remaining));

    if !outcome.success && self.config.stop_on_error {
      self.terminate(SessionStatus::Cancelled);
    }
    true
  }

  /// `running -> completed`, once every record has a result.
  pub fn finish(&mut self) -> bool {
    if self.status != SessionStatus::Running || self.remaining() > 0 {
      return false;
    }
    self.terminate(SessionStatus::Completed);
    true
  }

  /// Whether a terminal session has outlived `retention` at `now`.
  pub fn is_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
    self.is_terminal()
      && self
        .completed_at
        .and_then(|at| now.signed_duration_since(at).to_std().ok())
        .is_some_and(|age| age >= retention)
  }

  /// Enters a terminal status.
  fn terminate(&mut self, status: SessionStatus) {
    let now = Utc::now();
    self.status = status;
    self.completed_at = Some(now);
    self.estimated_completion = Some(now);
  }

  /// Average item duration times the number of remaining rounds.
  ///
  /// `None` when the estimate doesn't fit in a duration.
  fn estimate_remaining(&self) -> Option<chrono::Duration> {
    if self.results.is_empty() {
      return Some(chrono::Duration::zero());
    }
    let total =
      self.results.iter().try_fold(Duration::ZERO, |total, r| total.checked_add(r.duration))?;
    let average = total / u32::try_from(self.results.len()).ok()?;
    let rounds = u32::try_from(self.remaining().div_ceil(self.config.concurrency.max(1))).ok()?;
    chrono::Duration::from_std(average.checked_mul(rounds)?).ok()
  }
}
