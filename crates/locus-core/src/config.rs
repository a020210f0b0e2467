//! Configuration types for Locus components.
//!
//! Runtime tuning lives in plain structs with defaults and `with_*` builders.
//! The operator-facing configuration (`locus.toml`) names the accounts to
//! harvest and the retention period; `locus configure` copies it into the store
//! so that every slice reads the same values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AppError;
use crate::schema::audit_log;
use crate::window::RetentionWeeks;

/// Default number of retained weeks.
pub const DEFAULT_RETENTION_WEEKS: i64 = 52;

/// Database connection pool configuration.
pub struct DbConfig {
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { max_connections: 5 }
    }
}

impl DbConfig {
    /// Reads `DB_MAX_CONNECTIONS`, falling back to the default.
    pub fn from_env() -> Self {
        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::default().max_connections);
        Self { max_connections }
    }
}

/// HTTP client configuration for the Business Profile APIs.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    /// Pause between consecutive page requests.
    pub page_delay: Duration,
    pub user_agent: String,
    pub account_api_url: String,
    pub business_info_api_url: String,
    pub insights_api_url: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            page_delay: Duration::from_millis(250),
            user_agent: format!("Locus/{} (insights-harvester)", env!("CARGO_PKG_VERSION")),
            account_api_url: "https://mybusinessaccountmanagement.googleapis.com/v1/".to_string(),
            business_info_api_url: "https://mybusinessbusinessinformation.googleapis.com/v1/"
                .to_string(),
            insights_api_url: "https://mybusiness.googleapis.com/v4/".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Points all three APIs at one base URL. Used against local stubs.
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = format!("{}/", base.trim_end_matches('/'));
        self.account_api_url = base.clone();
        self.business_info_api_url = base.clone();
        self.insights_api_url = base;
        self
    }
}

/// Batching and retry policy of the fetch engine.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Maximum locations per `reportInsights` call.
    pub batch_size: usize,
    /// Maximum calls per batch, counting the first.
    pub max_attempts: u32,
    /// Sleep before attempt `n` is `n * base_delay`.
    pub base_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl FetchConfig {
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Resume driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Wall-clock budget of one slice; checked before each batch.
    pub slice_budget: Duration,
    /// How far the listing boundary trails the present, in days.
    pub data_lag_days: i64,
    /// Audit log rows kept by a trim.
    pub log_max_rows: usize,
    pub fetch: FetchConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            slice_budget: Duration::from_secs(25 * 60),
            data_lag_days: 7,
            log_max_rows: audit_log::MAX_ROWS,
            fetch: FetchConfig::default(),
        }
    }
}

impl DriverConfig {
    pub fn with_slice_budget(mut self, budget: Duration) -> Self {
        self.slice_budget = budget;
        self
    }

    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }
}

// =============================================================================
// Operator Configuration (locus.toml)
// =============================================================================

fn default_retention_weeks() -> i64 {
    DEFAULT_RETENTION_WEEKS
}

/// Root configuration structure for locus.toml.
///
/// # Example
///
/// ```toml
/// retention_weeks = 52
///
/// [[accounts]]
/// name = "Bakeries North"
/// status_filter = "OPEN"
///
/// [[accounts]]
/// name = "Bakeries South"
/// region_filter = "IT"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocusConfig {
    #[serde(default = "default_retention_weeks")]
    pub retention_weeks: i64,
    #[serde(default)]
    pub accounts: Vec<AccountEntry>,
}

/// One account to harvest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountEntry {
    /// Account display name, matched against the refreshed accounts listing.
    pub name: String,
    /// `openInfo.status` filter, e.g. `OPEN`. `-none-` disables it.
    pub status_filter: Option<String>,
    /// `storefrontAddress.regionCode` filter, e.g. `IT`. `-none-` disables it.
    pub region_filter: Option<String>,
}

impl LocusConfig {
    /// Checks values that would otherwise only fail at pass time.
    pub fn validate(&self) -> Result<(), AppError> {
        RetentionWeeks::try_from(self.retention_weeks)?;
        if let Some(blank) = self.accounts.iter().find(|a| a.name.trim().is_empty()) {
            return Err(AppError::ConfigError(format!(
                "account entry with empty name: {:?}",
                blank
            )));
        }
        Ok(())
    }
}

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "locus.toml";

/// Returns the default configuration directory path: `~/.config/locus/`.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("locus"))
}

/// Returns the default configuration file path: `~/.config/locus/locus.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join(CONFIG_FILE_NAME))
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Locus configuration
#
# Usage:
#   locus accounts     # list the accounts your token can see
#   locus configure    # copy this file into the database
#   locus start        # start the yearly download
#
# Account names must match the display names printed by `locus accounts`.
# Filters are applied server-side; use "-none-" or omit them to disable.

# Number of weeks of insights to keep.
retention_weeks = 52

# [[accounts]]
# name = "My Business Group"
# status_filter = "OPEN"
# region_filter = "IT"
"#;

/// Load the operator configuration from a TOML file.
///
/// # Returns
/// * `Ok(Some(config))` - Configuration loaded successfully
/// * `Ok(None)` - No configuration file could be found or created
/// * `Err(e)` - Configuration file exists but is invalid
///
/// If no file exists at the default path, a commented template is created.
pub fn load_config(path: Option<PathBuf>) -> Result<Option<LocusConfig>, AppError> {
    let using_default_path = path.is_none();
    let config_path = match path {
        Some(p) => p,
        None => match default_config_path() {
            Some(p) => p,
            None => return Ok(None),
        },
    };

    if !config_path.exists() {
        if using_default_path {
            if let Err(e) = create_default_config(&config_path) {
                tracing::warn!("Could not create default config template: {}", e);
                return Ok(None);
            }
        } else {
            return Err(AppError::ConfigError(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }
    }

    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        AppError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    let config: LocusConfig = toml::from_str(&content).map_err(|e| {
        AppError::ConfigError(format!(
            "Invalid TOML in '{}': {}",
            config_path.display(),
            e
        ))
    })?;
    config.validate()?;

    Ok(Some(config))
}

fn create_default_config(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
    tracing::info!("Created default config template at: {}", path.display());

    Ok(())
}
