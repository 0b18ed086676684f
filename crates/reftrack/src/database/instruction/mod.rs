//! Database instructions for reading and writing reference records.
//!
//! Each instruction is a small value describing one operation; executing it against a
//! [`Database`] runs the whole operation inside a single SQLite call, so multi-statement
//! instructions are atomic.

use super::*;

/// Tracking new URLs.
pub mod add;
/// Looking records up.
pub mod query;
/// Writing field changes and intents.
pub mod update;

pub use self::{add::*, query::*, update::*};

/// An operation that can be executed against the database.
#[async_trait]
pub trait DatabaseInstruction {
  /// What executing the instruction yields.
  type Output;

  /// Runs the instruction.
  async fn execute(&self, db: &Database) -> Result<Self::Output>;
}
