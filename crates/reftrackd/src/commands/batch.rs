//! Module for running batch sessions from the command line.
//!
//! Starts a session on the orchestrator, then polls it at the configured interval and prints a
//! progress line whenever it moves, until the session completes or is cancelled.

use reftrack::{
  batch::{BatchConfig, SessionStatus},
  reference::ProcessingStatus,
};

use super::*;

/// What to store and how.
#[derive(Args, Clone, Debug)]
pub struct BatchArgs {
  /// Record ids, processed in the given order
  pub ids: Vec<i64>,

  /// Store every record of this section that isn't stored yet
  #[arg(long, short, conflicts_with = "ids")]
  pub section: Option<String>,

  /// Records stored in parallel, defaults to the configured value
  #[arg(long, short)]
  pub concurrency: Option<usize>,

  /// Cancel the rest of the batch at the first failure
  #[arg(long)]
  pub stop_on_error: bool,

  /// Leave out records whose intent is skip
  #[arg(long)]
  pub respect_intent: bool,
}

/// Runs one batch to the end and prints its summary.
///
/// Failed items don't fail the command; they are listed in the summary.
pub async fn batch<I: UserInteraction>(
  interaction: &I,
  reftrack: &Reftrack,
  args: BatchArgs,
) -> Result<()> {
  let ids = match (&args.section, args.ids.is_empty()) {
    (Some(section), _) => records_in(reftrack, Some(section.as_str()))
      .await?
      .into_iter()
      .filter(|record| {
        record.processing_status != ProcessingStatus::Stored
          && !record.processing_status.forbids_item()
      })
      .map(|record| record.id)
      .collect(),
    (None, false) => args.ids,
    (None, true) =>
      return Err(ReftrackdError::Usage("Give record ids or --section to pick records".into())),
  };
  if ids.is_empty() {
    return interaction.reply(ResponseContent::Info("Nothing to store"));
  }

  let config = BatchConfig::default()
    .with_concurrency(args.concurrency.unwrap_or(reftrack.config.batch.concurrency))
    .with_stop_on_error(args.stop_on_error)
    .with_respect_user_intent(args.respect_intent);
  let session = reftrack.orchestrator.create_and_start(ids, config)?;
  interaction.reply(ResponseContent::Info(&format!(
    "Started {} with {} record(s)",
    session.id, session.requested
  )))?;

  let mut last_seen = None;
  let done = reftrack
    .wait_for(&session.id, |snapshot| {
      let seen = (snapshot.current_index, snapshot.status);
      if last_seen != Some(seen) {
        last_seen = Some(seen);
        if let Err(e) = interaction.reply(ResponseContent::Progress(snapshot)) {
          warn!(error = %e, "Could not print progress");
        }
      }
    })
    .await;

  interaction.reply(ResponseContent::Session(&done))?;
  if done.status == SessionStatus::Cancelled {
    interaction.reply(ResponseContent::Warning("Batch was cancelled before every record ran"))?;
  }
  Ok(())
}
