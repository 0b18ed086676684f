//! Module for handling configuration and database initialization.
//!
//! Writes `config.toml` into the configuration directory and creates the SQLite database it
//! points at. Re-running `init` over an existing configuration asks before overwriting it.

use reftrack::config::CONFIG_FILE;

use super::*;

/// Options for a new configuration; anything left out keeps its default.
#[derive(Args, Clone, Debug)]
pub struct InitArgs {
  /// Where to keep the database
  #[arg(long)]
  pub db_path: Option<PathBuf>,

  /// Base URL of the external store's connector endpoints
  #[arg(long)]
  pub service_url: Option<String>,

  /// Default number of records stored in parallel by a batch
  #[arg(long)]
  pub concurrency: Option<usize>,
}

/// Writes a configuration into `config_dir` and opens its database once to create it.
pub async fn init<I: UserInteraction>(
  interaction: &I,
  config_dir: &Path,
  args: InitArgs,
) -> Result<()> {
  let config_file = config_dir.join(CONFIG_FILE);
  if config_file.exists()
    && !interaction
      .confirm(&format!("{} already exists. Overwrite it?", config_file.display()))?
  {
    return interaction.reply(ResponseContent::Info("Keeping the existing configuration"));
  }

  let mut config = Config::default();
  if let Some(path) = &args.db_path {
    config = config.with_database_path(path);
  }
  if let Some(url) = args.service_url {
    config = config.with_service_url(url);
  }
  if let Some(concurrency) = args.concurrency {
    config = config.with_concurrency(concurrency);
  }
  config.validate()?;

  let saved = config.save(config_dir)?;
  info!(path = %saved.display(), "Saved configuration");
  let reftrack = Reftrack::open(config).await?;

  interaction
    .reply(ResponseContent::Success(&format!("Configuration written to {}", saved.display())))?;
  interaction.reply(ResponseContent::Success(&format!(
    "Database ready at {}",
    reftrack.config.database_path.display()
  )))
}
