//! Module for breaking the link between a record and its external item.
//!
//! `unlink` only forgets the item key locally. `delete` removes the item from the external store
//! first and forgets the key only once that succeeded.

use super::*;

/// Clears a record's linkage, leaving its external item in place.
pub async fn unlink<I: UserInteraction>(
  interaction: &I,
  reftrack: &Reftrack,
  args: RecordArgs,
) -> Result<()> {
  let record = reftrack.database.get(args.id).await?;
  let Some(key) = &record.item_key else {
    return interaction.reply(ResponseContent::Info(&format!("#{} is not linked", record.id)));
  };
  if !interaction.confirm(&format!("Unlink #{} from item {key}? The item stays in the store.", record.id))? {
    return interaction.reply(ResponseContent::Info("Unlink cancelled"));
  }

  let record = reftrack.repairer.unlink(args.id).await?;
  interaction.reply(ResponseContent::Success(&format!("Unlinked #{}", record.id)))
}

/// Deletes a record's external item, then clears its linkage.
pub async fn delete<I: UserInteraction>(
  interaction: &I,
  reftrack: &Reftrack,
  args: RecordArgs,
) -> Result<()> {
  let record = reftrack.database.get(args.id).await?;
  let Some(key) = &record.item_key else {
    return interaction.reply(ResponseContent::Info(&format!("#{} has no item to delete", record.id)));
  };
  if !interaction.confirm(&format!("Delete item {key} from the store and unlink #{}?", record.id))? {
    return interaction.reply(ResponseContent::Info("Delete cancelled"));
  }

  let record = reftrack.repairer.delete(args.id).await?;
  interaction.reply(ResponseContent::Success(&format!("Deleted item {key} of #{}", record.id)))
}
