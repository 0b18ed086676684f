//! On-disk configuration.
//!
//! Configuration lives in `config.toml` inside the configuration directory:
//! - On Unix: `~/.config/reftrack/config.toml`
//! - On macOS: `~/Library/Application Support/reftrack/config.toml`
//! - On Windows: `%APPDATA%\reftrack\config.toml`
//!
//! ```toml
//! database_path = "/home/me/.local/share/reftrack/reftrack.db"
//!
//! [service]
//! base_url = "http://localhost:23119/citationlinker"
//! timeout_secs = 30
//! max_retries = 3
//! retry_delay_ms = 1000
//!
//! [batch]
//! concurrency = 5
//! poll_interval_ms = 500
//! retention_secs = 3600
//! sweep_interval_secs = 300
//! ```

use super::*;

/// Name of the configuration file inside the configuration directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
  /// SQLite database holding sections and records
  pub database_path: PathBuf,
  /// External item store connection
  #[serde(default)]
  pub service:       ServiceConfig,
  /// Batch defaults
  #[serde(default)]
  pub batch:         BatchDefaults,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      database_path: Database::default_path(),
      service:       ServiceConfig::default(),
      batch:         BatchDefaults::default(),
    }
  }
}

impl Config {
  /// Default configuration directory, falling back to `./reftrack`.
  pub fn default_path() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("reftrack")
  }

  /// Loads `config.toml` from `dir`.
  pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
    let path = dir.as_ref().join(CONFIG_FILE);
    let content = std::fs::read_to_string(&path).map_err(|e| {
      ReftrackError::Config(format!("Failed to read {}: {e}", path.display()))
    })?;
    let config: Self = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
  }

  /// Writes `config.toml` into `dir`, creating the directory if needed.
  pub fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let path = dir.join(CONFIG_FILE);
    std::fs::write(&path, toml::to_string_pretty(self)?)?;
    Ok(path)
  }

  /// Rejects values the orchestrator or client cannot work with.
  pub fn validate(&self) -> Result<()> {
    if self.batch.concurrency == 0 {
      return Err(ReftrackError::InvalidConfig("batch.concurrency must be at least 1".into()));
    }
    if self.batch.poll_interval_ms == 0 {
      return Err(ReftrackError::InvalidConfig("batch.poll_interval_ms must be positive".into()));
    }
    if self.service.timeout_secs == 0 {
      return Err(ReftrackError::InvalidConfig("service.timeout_secs must be positive".into()));
    }
    Ok(())
  }

  /// Sets the database location.
  pub fn with_database_path(mut self, path: &Path) -> Self {
    self.database_path = path.to_path_buf();
    self
  }

  /// Sets the connector base URL.
  pub fn with_service_url(mut self, url: impl Into<String>) -> Self {
    self.service.base_url = url.into();
    self
  }

  /// Sets the default batch concurrency.
  pub fn with_concurrency(mut self, concurrency: usize) -> Self {
    self.batch.concurrency = concurrency;
    self
  }
}

/// Connection settings for the external item store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
  /// Base URL of the connector endpoints
  pub base_url:       String,
  /// Per-request timeout
  pub timeout_secs:   u64,
  /// Retries for server errors
  pub max_retries:    u32,
  /// Delay between retries
  pub retry_delay_ms: u64,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      base_url:       "http://localhost:23119/citationlinker".to_string(),
      timeout_secs:   30,
      max_retries:    3,
      retry_delay_ms: 1000,
    }
  }
}

impl ServiceConfig {
  /// Per-request timeout.
  pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }

  /// Pause between retries of a server error.
  pub fn retry_delay(&self) -> Duration { Duration::from_millis(self.retry_delay_ms) }
}

/// Defaults for batch runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchDefaults {
  /// Items in flight per session
  pub concurrency:         usize,
  /// How often clients poll session status
  pub poll_interval_ms:    u64,
  /// How long terminal sessions are kept
  pub retention_secs:      u64,
  /// How often expired sessions are swept
  pub sweep_interval_secs: u64,
}

impl Default for BatchDefaults {
  fn default() -> Self {
    Self {
      concurrency:         batch::DEFAULT_CONCURRENCY,
      poll_interval_ms:    500,
      retention_secs:      3600,
      sweep_interval_secs: 300,
    }
  }
}

impl BatchDefaults {
  /// How often clients poll a running batch.
  pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms) }

  /// How long a finished session stays queryable.
  pub fn retention(&self) -> Duration { Duration::from_secs(self.retention_secs) }

  /// Period of the background retention sweep.
  pub fn sweep_interval(&self) -> Duration { Duration::from_secs(self.sweep_interval_secs) }
}
