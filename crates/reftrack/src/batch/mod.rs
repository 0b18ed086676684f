//! Batch sessions: bulk pipeline runs with progress reporting.
//!
//! A batch is started with [`Orchestrator::create_and_start`], which registers a
//! [`BatchSession`] and returns its first snapshot immediately; the items run in a background
//! task with at most [`BatchConfig::concurrency`] in flight. Callers follow progress by polling
//! ([`poll_until_terminal`]) and steer the run with pause, resume and cancel.
//!
//! ```text
//!            pause              cancel
//!  running ---------> paused ----------> cancelled
//!     ^                 |                    ^
//!     +-----resume------+                    |
//!     |                                      |
//!     +--------------- cancel ---------------+
//!     |
//!     +---- all items done ----> completed
//! ```
//!
//! Sessions only live in memory. Terminal sessions are kept for a retention window so late
//! pollers still see the final state, then removed by [`Orchestrator::sweep`].
//!
//! # Examples
//!
//! ```no_run
//! use reftrack::{batch::BatchConfig, Config, Reftrack};
//!
//! # async fn example() -> Result<(), reftrack::error::ReftrackError> {
//! let reftrack = Reftrack::open(Config::default()).await?;
//! let config = BatchConfig::default().with_concurrency(2).with_stop_on_error(true);
//! let session = reftrack.orchestrator.create_and_start(vec![1, 2, 3], config)?;
//!
//! let done = reftrack
//!   .wait_for(&session.id, |s| println!("{}/{} done", s.current_index, s.record_ids.len()))
//!   .await;
//! println!("{} ({} failed)", done.status, done.failed.len());
//! # Ok(())
//! # }
//! ```

use super::*;

/// Session registry and background execution.
pub mod orchestrator;
/// Client-side status polling.
pub mod poll;
/// The session aggregate and its state machine.
pub mod session;

pub use self::{
  orchestrator::Orchestrator,
  poll::{poll_until_terminal, StatusSource},
  session::{BatchConfig, BatchSession, ItemResult, SessionId, SessionStatus},
};

/// Items in flight per session unless configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// How often clients poll a running session.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long terminal sessions are kept before being swept.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);
