//! Subcommands of the `reftrack` binary.
//!
//! Each command takes a [`UserInteraction`] for output and prompts, the opened [`Reftrack`]
//! instance and its parsed arguments.

use clap::{Args, Subcommand};
use reftrack::{
  database::{DatabaseInstruction, Query},
  reference::Reference,
};

use super::*;

/// `add`
pub mod add;
/// `batch`
pub mod batch;
/// `check`
pub mod check;
/// `init`
pub mod init;
/// `intent`
pub mod intent;
/// `unlink` and `delete`
pub mod linkage;
/// `list` and `show`
pub mod list;
/// `repair`
pub mod repair;

pub use add::add;
pub use batch::batch;
pub use check::check;
pub use init::init;
pub use intent::intent;
pub use linkage::{delete, unlink};
pub use list::{list, show};
pub use repair::repair;

/// Available commands for the CLI
#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
  /// Write a configuration file and create the database
  Init(init::InitArgs),

  /// Track one or more URLs in a section
  Add(add::AddArgs),

  /// List tracked references
  List(list::ListArgs),

  /// Show every field of one reference
  Show(RecordArgs),

  /// Report integrity issues and the repairs that would fix them
  Check(check::CheckArgs),

  /// Apply repair plans to inconsistent references
  Repair(repair::RepairArgs),

  /// Record what should happen to a reference (process, skip, archive)
  Intent(intent::IntentArgs),

  /// Forget a reference's external item without deleting it
  Unlink(RecordArgs),

  /// Delete a reference's external item, then forget it
  Delete(RecordArgs),

  /// Store references in the external item store
  Batch(batch::BatchArgs),
}

/// Arguments naming a single record.
#[derive(Args, Clone, Debug)]
pub struct RecordArgs {
  /// Reference record id
  pub id: i64,
}

/// Records of the named section, or every record.
async fn records_in(reftrack: &Reftrack, section: Option<&str>) -> Result<Vec<Reference>> {
  let query = match section {
    Some(name) => Query::by_section(reftrack.database.find_section(name).await?.id),
    None => Query::list_all(),
  };
  Ok(query.execute(&reftrack.database).await?)
}
