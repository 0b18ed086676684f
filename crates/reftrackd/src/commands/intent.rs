//! Module for recording user intent.

use reftrack::{
  database::SetIntent,
  guard::detect_issues,
  reference::UserIntent,
};

use super::*;

/// The record and the intent to give it.
#[derive(Args, Clone, Debug)]
pub struct IntentArgs {
  /// Reference record id
  pub id: i64,

  /// One of: process, skip, archive
  pub intent: String,
}

/// Sets a record's intent.
///
/// Archiving a record that is still linked to an item leaves it inconsistent on purpose; the
/// follow-up repair decides whether the item is deleted.
pub async fn intent<I: UserInteraction>(
  interaction: &I,
  reftrack: &Reftrack,
  args: IntentArgs,
) -> Result<()> {
  let intent: UserIntent = args.intent.parse()?;
  let record = SetIntent::new(args.id, intent).execute(&reftrack.database).await?;
  interaction.reply(ResponseContent::Reference(&record))?;

  let issues = detect_issues(&record);
  if !issues.is_empty() {
    let names: Vec<_> = issues.iter().map(|issue| issue.as_str()).collect();
    return interaction.reply(ResponseContent::Warning(&format!(
      "#{} now has {}; run `reftrack repair {}`",
      record.id,
      names.join(", "),
      record.id
    )));
  }
  interaction.reply(ResponseContent::Success(&format!("#{} intent set to {intent}", record.id)))
}
