//! # Collector Configuration
//!
//! Timeout budgets and query identity for one collector, built in code or
//! from environment variables.
//!
//! ## Environment Variables
//!
//! - `TABLESNAP_CONSISTENCY_TIMEOUT` - Deadline for the catalog scan to converge (default: 10m)
//! - `TABLESNAP_STAGE_TIMEOUT` - Deadline for each cross-host stage barrier (default: 10m)
//! - `TABLESNAP_LOCK_ACQUIRE_TIMEOUT` - Deadline for one table share-lock (default: 120s)
//! - `TABLESNAP_QUERY_ID` - Identifier the table locks are taken under (default: random UUID)
//!
//! Durations accept a bare number of seconds or a humantime string such as
//! `30s` or `5m`. For the two deadlines, a negative number or `infinite`
//! means "wait indefinitely".

use std::env;
use std::time::Duration;

use tablesnap_core::BackupError;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for BackupError {
    fn from(err: ConfigError) -> Self {
        BackupError::Config(err.to_string())
    }
}

const DEFAULT_CONSISTENCY_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_LOCK_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration of a [`crate::BackupEntriesCollector`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Deadline for the catalog scan to converge, `None` retries forever
    pub consistency_timeout: Option<Duration>,
    /// Deadline for every stage barrier, `None` waits forever
    pub stage_timeout: Option<Duration>,
    /// Deadline for acquiring one table's share lock
    pub lock_acquire_timeout: Duration,
    /// Query the acquired table locks belong to
    pub query_id: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            consistency_timeout: Some(DEFAULT_CONSISTENCY_TIMEOUT),
            stage_timeout: Some(DEFAULT_STAGE_TIMEOUT),
            lock_acquire_timeout: DEFAULT_LOCK_ACQUIRE_TIMEOUT,
            query_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl CollectorConfig {
    #[must_use]
    pub fn builder() -> CollectorConfigBuilder {
        CollectorConfigBuilder::new()
    }

    /// Load configuration from environment variables on top of the defaults
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        CollectorConfigBuilder::from_env()?.build()
    }

    /// Apply one overall timeout to both the scan and the stage barriers
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.consistency_timeout = timeout;
        self.stage_timeout = timeout;
        self
    }
}

/// Builder for [`CollectorConfig`] with environment variable support
#[derive(Debug, Clone, Default)]
pub struct CollectorConfigBuilder {
    config: CollectorConfig,
}

impl CollectorConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any environment variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = Self::default();

        if let Some(timeout) = get_env_deadline("TABLESNAP_CONSISTENCY_TIMEOUT")? {
            builder = builder.consistency_timeout(timeout);
        }
        if let Some(timeout) = get_env_deadline("TABLESNAP_STAGE_TIMEOUT")? {
            builder = builder.stage_timeout(timeout);
        }
        if let Some(timeout) = get_env_duration("TABLESNAP_LOCK_ACQUIRE_TIMEOUT")? {
            builder = builder.lock_acquire_timeout(timeout);
        }
        if let Some(query_id) = get_env_string("TABLESNAP_QUERY_ID") {
            builder = builder.query_id(query_id);
        }

        Ok(builder)
    }

    #[must_use]
    pub fn consistency_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.consistency_timeout = timeout;
        self
    }

    #[must_use]
    pub fn stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.stage_timeout = timeout;
        self
    }

    #[must_use]
    pub fn lock_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.lock_acquire_timeout = timeout;
        self
    }

    #[must_use]
    pub fn query_id(mut self, query_id: impl Into<String>) -> Self {
        self.config.query_id = query_id.into();
        self
    }

    /// Validate and produce the configuration
    pub fn build(self) -> Result<CollectorConfig, ConfigError> {
        if self.config.query_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "query_id must not be empty".to_string(),
            ));
        }
        if self.config.lock_acquire_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "lock_acquire_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(self.config)
    }
}

fn get_env_string(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn get_env_duration(key: &str) -> Result<Option<Duration>, ConfigError> {
    match env::var(key) {
        Ok(val) => parse_duration(&val)
            .map(Some)
            .map_err(|message| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message,
            }),
        Err(_) => Ok(None),
    }
}

fn get_env_deadline(key: &str) -> Result<Option<Option<Duration>>, ConfigError> {
    match env::var(key) {
        Ok(val) => parse_deadline(&val)
            .map(Some)
            .map_err(|message| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message,
            }),
        Err(_) => Ok(None),
    }
}

/// Parse a deadline: negative numbers and `infinite` mean no deadline
pub(crate) fn parse_deadline(value: &str) -> Result<Option<Duration>, String> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("infinite") || value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    if let Some(rest) = value.strip_prefix('-') {
        return match rest.parse::<f64>() {
            Ok(_) => Ok(None),
            Err(e) => Err(format!("invalid negative timeout '{value}': {e}")),
        };
    }
    parse_duration(value).map(Some)
}

pub(crate) fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(value).map_err(|e| format!("invalid duration '{value}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_builder() {
        let config = CollectorConfigBuilder::new().build().unwrap();
        assert_eq!(config.consistency_timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.stage_timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.lock_acquire_timeout, Duration::from_secs(120));
        assert!(uuid::Uuid::parse_str(&config.query_id).is_ok());
    }

    #[test]
    fn test_parse_deadline() {
        assert_eq!(parse_deadline("-1").unwrap(), None);
        assert_eq!(parse_deadline("infinite").unwrap(), None);
        assert_eq!(parse_deadline("30").unwrap(), Some(Duration::from_secs(30)));
        assert_eq!(parse_deadline("5m").unwrap(), Some(Duration::from_secs(300)));
        assert_eq!(parse_deadline("0").unwrap(), Some(Duration::ZERO));
        assert!(parse_deadline("-x").is_err());
        assert!(parse_deadline("soon").is_err());
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            CollectorConfig::builder().query_id("  ").build(),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            CollectorConfig::builder()
                .lock_acquire_timeout(Duration::ZERO)
                .build(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_overall_timeout_sets_both_budgets() {
        let config = CollectorConfig::default().with_timeout(None);
        assert_eq!(config.consistency_timeout, None);
        assert_eq!(config.stage_timeout, None);
    }

    #[test]
    fn test_config_error_converts_to_backup_error() {
        let err: BackupError = ConfigError::ValidationError("bad".to_string()).into();
        assert!(matches!(err, BackupError::Config(message) if message.contains("bad")));
    }
}
