//! Module for listing and showing references.

use reftrack::{guard::detect_issues, reference::ProcessingStatus};

use super::*;

/// Filters for `list`.
#[derive(Args, Clone, Debug)]
pub struct ListArgs {
  /// Only records in this section
  #[arg(long, short)]
  pub section: Option<String>,

  /// Only records with this processing status (e.g. not_started, stored, failed)
  #[arg(long)]
  pub status: Option<String>,

  /// Only records that violate an integrity invariant
  #[arg(long)]
  pub issues: bool,

  /// Print JSON instead of a table
  #[arg(long)]
  pub json: bool,
}

/// Lists records matching every given filter.
pub async fn list<I: UserInteraction>(
  interaction: &I,
  reftrack: &Reftrack,
  args: ListArgs,
) -> Result<()> {
  let status = args.status.as_deref().map(str::parse::<ProcessingStatus>).transpose()?;

  let mut records = records_in(reftrack, args.section.as_deref()).await?;
  records.retain(|record| {
    status.map_or(true, |status| record.processing_status == status)
      && (!args.issues || !detect_issues(record).is_empty())
  });
  debug!(count = records.len(), "Listing references");

  if args.json {
    return interaction.reply(ResponseContent::Raw(&serde_json::to_string_pretty(&records)?));
  }
  interaction.reply(ResponseContent::References(&records))
}

/// Shows one record in full.
pub async fn show<I: UserInteraction>(
  interaction: &I,
  reftrack: &Reftrack,
  args: RecordArgs,
) -> Result<()> {
  let record = reftrack.database.get(args.id).await?;
  interaction.reply(ResponseContent::Reference(&record))
}
