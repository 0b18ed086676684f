//! Client-side polling of session status.
//!
//! Progress is pull-based: a client asks for a snapshot every poll interval (500 ms by default)
//! until the session is `completed` or `cancelled`. A failed query is not fatal; the next tick
//! simply asks again.

use tokio::time::MissedTickBehavior;

use super::*;

/// Anything that can answer "what does session `id` look like now".
#[async_trait]
pub trait StatusSource: Send + Sync {
  /// The current snapshot of a session.
  async fn session_status(&self, id: &SessionId) -> Result<BatchSession>;
}

#[async_trait]
impl StatusSource for Orchestrator {
  async fn session_status(&self, id: &SessionId) -> Result<BatchSession> { self.get_status(id) }
}

/// Polls `source` every `interval`, starting immediately, until the session is terminal.
///
/// `on_update` sees every snapshot, including the terminal one, which is also returned.
///
/// # Examples
///
/// ```no_run
/// use reftrack::batch::{poll_until_terminal, Orchestrator, SessionId, DEFAULT_POLL_INTERVAL};
///
/// # async fn example(orchestrator: Orchestrator, id: SessionId) {
/// let done = poll_until_terminal(&orchestrator, &id, DEFAULT_POLL_INTERVAL, |session| {
///   println!("{:.0}%", session.progress() * 100.0);
/// })
/// .await;
/// println!("finished as {}", done.status);
/// # }
/// ```
pub async fn poll_until_terminal<S, F>(
  source: &S,
  id: &SessionId,
  interval: Duration,
  mut on_update: F,
) -> BatchSession
where
  S: StatusSource + ?Sized,
  F: FnMut(&BatchSession) + Send,
{
  let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
  let mut failures = 0_u32;
  loop {
    ticker.tick().await;
    match source.session_status(id).await {
      Ok(session) => {
        failures = 0;
        on_update(&session);
        if session.is_terminal() {
          debug!(session = %id, status = %session.status, "Polling finished");
          return session;
        }
      },
      Err(e) => {
        failures += 1;
        warn!(session = %id, failures, error = %e, "Status query failed; retrying");
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{collections::VecDeque, sync::Mutex};

  use super::*;

  /// Replays scripted answers, repeating the last one.
  struct Script(Mutex<VecDeque<Result<BatchSession>>>);

  #[async_trait]
  impl StatusSource for Script {
    async fn session_status(&self, id: &SessionId) -> Result<BatchSession> {
      let mut answers = self.0.lock().unwrap();
      if answers.len() > 1 {
        return answers.pop_front().unwrap();
      }
      match answers.front() {
        Some(Ok(session)) => Ok(session.clone()),
        _ => Err(ReftrackError::SessionNotFound(id.to_string())),
      }
    }
  }

  fn session_with(status: SessionStatus, done: usize) -> BatchSession {
    let id = SessionId::from("batch_1_abcdef01");
    let mut session = BatchSession::new(id, vec![1, 2], BatchConfig::default());
    session.status = status;
    session.current_index = done;
    session
  }

  #[traced_test]
  #[tokio::test]
  async fn test_polls_through_errors_until_terminal() {
    let id = SessionId::from("batch_1_abcdef01");
    let script = Script(Mutex::new(VecDeque::from([
      Err(ReftrackError::SessionNotFound(id.to_string())),
      Ok(session_with(SessionStatus::Running, 0)),
      Ok(session_with(SessionStatus::Paused, 1)),
      Ok(session_with(SessionStatus::Completed, 2)),
    ])));

    let mut seen = Vec::new();
    let done =
      poll_until_terminal(&script, &id, Duration::from_millis(5), |s| seen.push(s.status)).await;

    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(seen, [SessionStatus::Running, SessionStatus::Paused, SessionStatus::Completed]);
    assert!(logs_contain("Status query failed"));
  }

  #[traced_test]
  #[tokio::test]
  async fn test_polls_orchestrator() {
    use crate::pipeline::{ItemOutcome, ItemPipeline};

    struct Immediate;

    #[async_trait]
    impl ItemPipeline for Immediate {
      async fn process(&self, record_id: i64) -> ItemOutcome {
        ItemOutcome::succeeded(ItemKey::new(format!("K{record_id}")), Duration::ZERO)
      }
    }

    let orchestrator = Orchestrator::new(Arc::new(Immediate));
    let started = orchestrator.create_and_start(vec![1, 2, 3], BatchConfig::default()).unwrap();
    let done = tokio::time::timeout(
      Duration::from_secs(5),
      poll_until_terminal(&orchestrator, &started.id, Duration::from_millis(10), |_| {}),
    )
    .await
    .unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.current_index, 3);
  }
}
