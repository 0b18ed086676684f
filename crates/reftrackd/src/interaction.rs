//! Terminal output and prompts.
//!
//! Commands never print directly; they hand [`ResponseContent`] to a [`UserInteraction`], so the
//! same command code runs behind interactive prompts or with every prompt auto-accepted.

use chrono::Local;
use console::style;
use dialoguer::Confirm;
use reftrack::{batch::BatchSession, guard::detect_issues, reference::Reference, repair::Diagnosis};

use super::*;

/// Informational messages
pub static INFO_PREFIX: &str = "ℹ ";
/// Work in progress
pub static WORKING_PREFIX: &str = "» ";
/// Completed actions
pub static SUCCESS_PREFIX: &str = "✓ ";
/// Errors
pub static ERROR_PREFIX: &str = "✗ ";
/// Warnings
pub static WARNING_PREFIX: &str = "! ";
/// Questions
pub static PROMPT_PREFIX: &str = "❯ ";
/// Tree branch
pub static ITEM_PREFIX: &str = "├─";
/// Last tree branch
pub static LAST_ITEM_PREFIX: &str = "└─";
/// Proposed change
pub static ARROW: &str = "→";

/// Something a command wants shown to the user.
#[derive(Debug)]
pub enum ResponseContent<'a> {
  /// One record with all of its fields
  Reference(&'a Reference),
  /// A one-line-per-record table
  References(&'a [Reference]),
  /// A record's issues and proposed repair
  Diagnosis(&'a Diagnosis),
  /// Summary of a finished batch
  Session(&'a BatchSession),
  /// A live progress line for a running batch
  Progress(&'a BatchSession),
  /// Printed exactly as given, for machine-readable output
  Raw(&'a str),
  /// An action finished
  Success(&'a str),
  /// Neutral information
  Info(&'a str),
  /// Something needs attention
  Warning(&'a str),
  /// A command failed
  Error(ReftrackdError),
}

/// How commands talk to the user.
pub trait UserInteraction: Sync {
  /// Asks a yes/no question.
  fn confirm(&self, message: &str) -> Result<bool>;

  /// Shows some output.
  fn reply(&self, content: ResponseContent) -> Result<()>;
}

/// Interaction over stdout and an interactive terminal.
pub struct Terminal {
  /// Answer every prompt with yes
  accept_defaults: bool,
}

impl Terminal {
  /// A terminal; with `accept_defaults` every confirmation answers yes.
  pub fn new(accept_defaults: bool) -> Self { Self { accept_defaults } }
}

impl UserInteraction for Terminal {
  fn confirm(&self, message: &str) -> Result<bool> {
    if self.accept_defaults {
      return Ok(true);
    }
    let answer = Confirm::new()
      .with_prompt(format!("{}{message}", style(PROMPT_PREFIX).yellow()))
      .default(false)
      .interact()?;
    Ok(answer)
  }

  fn reply(&self, content: ResponseContent) -> Result<()> {
    match content {
      ResponseContent::Reference(record) => print_reference(record, true),
      ResponseContent::References(records) =>
        if records.is_empty() {
          println!("{}No references found", style(INFO_PREFIX).blue());
        } else {
          for record in records {
            print_reference(record, false);
          }
          println!("{}{} reference(s)", style(INFO_PREFIX).blue(), records.len());
        },
      ResponseContent::Diagnosis(diagnosis) => print_diagnosis(diagnosis),
      ResponseContent::Session(session) => print_session(session),
      ResponseContent::Progress(session) => println!(
        "{}{}/{} done, {} failed [{}]",
        style(WORKING_PREFIX).cyan(),
        session.current_index,
        session.record_ids.len(),
        session.failed.len(),
        session.status
      ),
      ResponseContent::Raw(text) => println!("{text}"),
      ResponseContent::Success(message) => println!("{}{message}", style(SUCCESS_PREFIX).green()),
      ResponseContent::Info(message) => println!("{}{message}", style(INFO_PREFIX).blue()),
      ResponseContent::Warning(message) => println!("{}{message}", style(WARNING_PREFIX).yellow()),
      ResponseContent::Error(error) => eprintln!("{}{error}", style(ERROR_PREFIX).red()),
    }
    Ok(())
  }
}

/// Prints one record, optionally with every field.
fn print_reference(record: &Reference, detailed: bool) {
  let key = record.item_key.as_ref().map_or("-", |key| key.as_str());
  let store = record.store_status.map_or("-", |status| status.as_str());
  let flag = if detect_issues(record).is_empty() { style(" ") } else { style("!").red().bold() };
  println!(
    "{flag} #{:<5} {:<12} {:<10} {:<10} {}",
    record.id,
    style(record.processing_status.as_str()).cyan(),
    store,
    key,
    record.url
  );
  if !detailed {
    return;
  }
  println!("   {ITEM_PREFIX} Intent: {}", record.intent);
  println!("   {ITEM_PREFIX} Attempts: {}", record.attempts);
  if let Some(error) = &record.store_error {
    println!("   {ITEM_PREFIX} Store error: {}", style(error).red());
  }
  if let Some(error) = &record.last_error {
    println!("   {ITEM_PREFIX} Last error: {}", style(error).red());
  }
  match &record.validation {
    Some(validation) if validation.is_valid() =>
      println!("   {ITEM_PREFIX} Citation: {}", style("complete").green()),
    Some(validation) => println!(
      "   {ITEM_PREFIX} Citation: {} (missing {})",
      style("incomplete").yellow(),
      validation.missing_fields().join(", ")
    ),
    None => {},
  }
  let updated = record.updated_at.with_timezone(&Local);
  println!("   {LAST_ITEM_PREFIX} Updated: {}", updated.format("%Y-%m-%d %H:%M:%S"));
}

/// Prints integrity issues and the proposed plan.
fn print_diagnosis(diagnosis: &Diagnosis) {
  print_reference(&diagnosis.record, false);
  if !diagnosis.has_issues() {
    println!("   {LAST_ITEM_PREFIX} {}", style("consistent").green());
    return;
  }
  for issue in &diagnosis.issues {
    println!("   {ITEM_PREFIX} {} {}", style(issue).red().bold(), style(issue.description()).dim());
  }
  match &diagnosis.plan {
    Some(plan) => {
      if let Some(key) = &plan.delete_item {
        println!("   {ITEM_PREFIX} {ARROW} delete external item {}", style(key).yellow());
      }
      for change in &plan.changes {
        println!("   {ITEM_PREFIX} {ARROW} {change}");
      }
      println!("   {LAST_ITEM_PREFIX} {}", plan.reasoning);
    },
    None => println!("   {LAST_ITEM_PREFIX} {}", style("No automatic repair; fix manually").red()),
  }
}

/// Prints the final state of a batch.
fn print_session(session: &BatchSession) {
  let elapsed = session
    .completed_at
    .map(|at| (at - session.started_at).num_milliseconds() as f64 / 1000.0)
    .unwrap_or_default();
  println!("{}Batch {} {} in {elapsed:.1}s", style(INFO_PREFIX).blue(), session.id, session.status);
  println!("   {ITEM_PREFIX} Requested: {}", session.requested);
  println!("   {ITEM_PREFIX} Stored: {}", style(session.completed.len()).green());
  println!("   {ITEM_PREFIX} Skipped: {}", session.skipped.len());
  println!("   {LAST_ITEM_PREFIX} Failed: {}", style(session.failed.len()).red());
  for result in session.results.iter().filter(|result| !result.success) {
    println!(
      "      {ITEM_PREFIX} #{} {}",
      result.record_id,
      result.error.as_deref().unwrap_or("unknown error")
    );
  }
}
