//! Module for tracking new URLs.

use super::*;

/// URLs to track and the section they belong to.
#[derive(Args, Clone, Debug)]
pub struct AddArgs {
  /// Section name, created if it doesn't exist
  pub section: String,

  /// One or more absolute http(s) URLs
  #[arg(required = true)]
  pub urls: Vec<String>,
}

/// Tracks each URL in the section.
///
/// A URL the section already tracks, or one that fails validation, is reported and skipped; the
/// command fails only if nothing could be added.
pub async fn add<I: UserInteraction>(interaction: &I, reftrack: &Reftrack, args: AddArgs) -> Result<()> {
  let section_id = reftrack.database.ensure_section(&args.section).await?;

  let mut added = 0;
  let mut last_error = None;
  for url in &args.urls {
    match reftrack.add_reference(section_id, url).await {
      Ok(record) => {
        added += 1;
        interaction.reply(ResponseContent::Success(&format!("Tracking #{} {url}", record.id)))?;
      },
      Err(e @ ReftrackError::DuplicateReference { .. }) => {
        interaction.reply(ResponseContent::Warning(&e.to_string()))?;
      },
      Err(e) => {
        warn!(%url, error = %e, "Rejected URL");
        interaction.reply(ResponseContent::Warning(&format!("Skipping {url}: {e}")))?;
        last_error = Some(e);
      },
    }
  }

  match (added, last_error) {
    (0, Some(e)) => Err(e.into()),
    _ => interaction.reply(ResponseContent::Info(&format!(
      "Added {added} reference(s) to section \"{}\"",
      args.section
    ))),
  }
}
