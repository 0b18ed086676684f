//! Module for applying repair plans.
//!
//! Shows each inconsistent record with its plan and asks before applying anything. Plans that
//! delete an external item say so in the prompt, since that part can't be undone.

use reftrack::{
  guard::detect_issues,
  repair::{Diagnosis, RepairOutcome},
};

use super::*;

/// Which records to repair.
#[derive(Args, Clone, Debug)]
pub struct RepairArgs {
  /// Repair only this record; omit to repair every inconsistent record
  pub id: Option<i64>,

  /// Limit a repair of many records to this section
  #[arg(long, short, conflicts_with = "id")]
  pub section: Option<String>,

  /// Apply without asking
  #[arg(long, short)]
  pub yes: bool,
}

/// Repairs one record or every inconsistent record.
///
/// Records are repaired one at a time; a failure is reported and the remaining records are still
/// attempted. The command fails if any repair failed.
pub async fn repair<I: UserInteraction>(
  interaction: &I,
  reftrack: &Reftrack,
  args: RepairArgs,
) -> Result<()> {
  let diagnoses = match args.id {
    Some(id) => vec![reftrack.repairer.diagnose(id).await?],
    None => {
      let mut diagnoses = Vec::new();
      let records = records_in(reftrack, args.section.as_deref()).await?;
      for record in records.iter().filter(|record| !detect_issues(record).is_empty()) {
        diagnoses.push(reftrack.repairer.diagnose(record.id).await?);
      }
      diagnoses
    },
  };

  let pending: Vec<&Diagnosis> = diagnoses.iter().filter(|d| d.has_issues()).collect();
  if pending.is_empty() {
    return interaction.reply(ResponseContent::Success("Nothing to repair"));
  }

  let mut failures = 0;
  for diagnosis in pending {
    let id = diagnosis.record.id;
    interaction.reply(ResponseContent::Diagnosis(diagnosis))?;
    let prompt = match diagnosis.plan.as_ref().and_then(|plan| plan.delete_item.as_ref()) {
      Some(key) => format!("Delete item {key} from the store and repair #{id}?"),
      None => format!("Repair #{id}?"),
    };
    if !args.yes && !interaction.confirm(&prompt)? {
      interaction.reply(ResponseContent::Info(&format!("Skipped #{id}")))?;
      continue;
    }

    match reftrack.repairer.repair(id).await {
      Ok(RepairOutcome::Repaired { plan }) =>
        interaction.reply(ResponseContent::Success(&format!("Repaired #{id}: {}", plan.reasoning)))?,
      Ok(RepairOutcome::NoIssueFound) =>
        interaction.reply(ResponseContent::Info(&format!("#{id} was already consistent")))?,
      Err(e) => {
        failures += 1;
        interaction.reply(ResponseContent::Warning(&format!("Could not repair #{id}: {e}")))?;
      },
    }
  }

  if failures > 0 {
    return Err(ReftrackdError::Usage(format!("{failures} repair(s) failed")));
  }
  Ok(())
}
