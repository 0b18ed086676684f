//! Module for reporting integrity issues.

use reftrack::guard::detect_issues;

use super::*;

/// Which records to check.
#[derive(Args, Clone, Debug)]
pub struct CheckArgs {
  /// Check only this record
  pub id: Option<i64>,

  /// Check only records in this section
  #[arg(long, short, conflicts_with = "id")]
  pub section: Option<String>,
}

/// Shows the issues and proposed repair of every inconsistent record. Nothing is written.
pub async fn check<I: UserInteraction>(
  interaction: &I,
  reftrack: &Reftrack,
  args: CheckArgs,
) -> Result<()> {
  if let Some(id) = args.id {
    let diagnosis = reftrack.repairer.diagnose(id).await?;
    return interaction.reply(ResponseContent::Diagnosis(&diagnosis));
  }

  let records = records_in(reftrack, args.section.as_deref()).await?;
  let total = records.len();
  let mut inconsistent = 0;
  for record in records.iter().filter(|record| !detect_issues(record).is_empty()) {
    inconsistent += 1;
    let diagnosis = reftrack.repairer.diagnose(record.id).await?;
    interaction.reply(ResponseContent::Diagnosis(&diagnosis))?;
  }

  if inconsistent == 0 {
    interaction.reply(ResponseContent::Success(&format!("All {total} reference(s) are consistent")))
  } else {
    interaction.reply(ResponseContent::Warning(&format!(
      "{inconsistent} of {total} reference(s) need repair; run `reftrack repair`"
    )))
  }
}
