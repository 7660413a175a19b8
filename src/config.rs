//! Configuration types for ads-report-dl
//!
//! Configuration is loaded from a JSON file passed on the command line and
//! threaded explicitly through the processor's constructor; there is no global
//! application context.

use crate::error::{Error, Result};
use crate::types::{DateRange, ReportType, RowErrorPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Report API endpoint and credentials
///
/// The vendor client proper (auth flows, protocol details) is out of scope;
/// this is the narrow surface the fetcher needs to issue download requests.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Report download endpoint URL
    pub endpoint: String,

    /// Bearer token sent in the Authorization header
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Manager account id sent with every request
    #[serde(default)]
    pub manager_account_id: Option<i64>,

    /// Per-request timeout in seconds (default: 120)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ApiConfig {
    /// The request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Batch run behavior: which reports to pull and how aggressively
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Report types downloaded for every account (default: all known types)
    #[serde(default = "default_report_types")]
    pub report_types: Vec<ReportType>,

    /// Account ids to process; may be overridden by the CLI account-ids file
    #[serde(default)]
    pub account_ids: Vec<i64>,

    /// Date range used when the CLI does not supply one
    #[serde(default)]
    pub date_range: Option<DateRange>,

    /// Maximum account tasks in flight at once (default: 4)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Entities per persistence batch; tunes round-trips, not correctness
    /// (default: 500)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// What to do when one row of a report fails to map (default: skip the row)
    #[serde(default)]
    pub row_error_policy: RowErrorPolicy,

    /// Fraction of failed tasks above which the whole run is reported as
    /// failed (default: 0.0 — any failure fails the run)
    #[serde(default)]
    pub failure_rate_threshold: f64,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            report_types: default_report_types(),
            account_ids: Vec::new(),
            date_range: None,
            concurrency: default_concurrency(),
            chunk_size: default_chunk_size(),
            row_error_policy: RowErrorPolicy::default(),
            failure_rate_threshold: 0.0,
        }
    }
}

/// Data storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database file (default: "./ads-reports.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry in milliseconds (default: 1000)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds (default: 60000)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl RetryConfig {
    /// Initial delay as a Duration
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Maximum delay as a Duration
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Export settings for the HTML/PDF summary mode
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Path to an HTML-to-PDF converter binary; when unset the PATH is
    /// searched for `wkhtmltopdf` and PDF conversion is skipped if absent
    #[serde(default)]
    pub pdf_tool_path: Option<PathBuf>,
}

/// Main configuration for a report run
///
/// Fields are organized into logical sub-configs:
/// - [`api`](ApiConfig) — endpoint and credentials
/// - [`reporting`](ReportingConfig) — report types, concurrency, policies
/// - [`persistence`](PersistenceConfig) — database location
/// - [`retry`](RetryConfig) — backoff behavior for transient failures
/// - [`export`](ExportConfig) — HTML/PDF summary generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Report API endpoint and credentials
    pub api: ApiConfig,

    /// Batch run behavior
    #[serde(default)]
    pub reporting: ReportingConfig,

    /// Data storage settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Retry behavior for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// HTML/PDF export settings
    #[serde(default)]
    pub export: ExportConfig,
}

impl Config {
    /// Load and validate configuration from a JSON file
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::config(
                "file",
                format!("cannot read config file {}: {e}", path.display()),
            )
        })?;
        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            Error::config(
                "file",
                format!("cannot parse config file {}: {e}", path.display()),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints, returning the offending key
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api.endpoint).map_err(|e| {
            Error::config("api.endpoint", format!("invalid endpoint URL: {e}"))
        })?;
        if self.reporting.report_types.is_empty() {
            return Err(Error::config(
                "reporting.report_types",
                "at least one report type is required",
            ));
        }
        if self.reporting.concurrency == 0 {
            return Err(Error::config(
                "reporting.concurrency",
                "concurrency must be at least 1",
            ));
        }
        if self.reporting.chunk_size == 0 {
            return Err(Error::config(
                "reporting.chunk_size",
                "chunk_size must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.reporting.failure_rate_threshold) {
            return Err(Error::config(
                "reporting.failure_rate_threshold",
                "failure_rate_threshold must be between 0.0 and 1.0",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                "backoff_multiplier must be at least 1.0",
            ));
        }
        Ok(())
    }
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_report_types() -> Vec<ReportType> {
    ReportType::all().to_vec()
}

fn default_concurrency() -> usize {
    4
}

fn default_chunk_size() -> usize {
    500
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./ads-reports.db")
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{ "api": { "endpoint": "https://ads.example.com/report" } }"#
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config: Config = serde_json::from_str(minimal_json()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.reporting.concurrency, 4);
        assert_eq!(config.reporting.chunk_size, 500);
        assert_eq!(config.reporting.report_types, ReportType::all().to_vec());
        assert_eq!(config.reporting.row_error_policy, RowErrorPolicy::SkipRow);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.retry.jitter);
        assert_eq!(config.persistence.database_path, PathBuf::from("./ads-reports.db"));
    }

    #[test]
    fn invalid_endpoint_is_rejected_with_key() {
        let config: Config =
            serde_json::from_str(r#"{ "api": { "endpoint": "not a url" } }"#).unwrap();
        let err = config.validate().unwrap_err();
        match err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("api.endpoint")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config: Config = serde_json::from_str(
            r#"{
                "api": { "endpoint": "https://ads.example.com/report" },
                "reporting": { "concurrency": 0 }
            }"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn threshold_outside_unit_interval_is_rejected() {
        let config: Config = serde_json::from_str(
            r#"{
                "api": { "endpoint": "https://ads.example.com/report" },
                "reporting": { "failure_rate_threshold": 1.5 }
            }"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn date_range_accepts_named_and_custom_forms() {
        let config: Config = serde_json::from_str(
            r#"{
                "api": { "endpoint": "https://ads.example.com/report" },
                "reporting": { "date_range": "LAST_7_DAYS" }
            }"#,
        )
        .unwrap();
        assert!(matches!(
            config.reporting.date_range,
            Some(DateRange::Relative(crate::types::RelativeRange::Last7Days))
        ));

        let config: Config = serde_json::from_str(
            r#"{
                "api": { "endpoint": "https://ads.example.com/report" },
                "reporting": { "date_range": { "start": "2013-01-01", "end": "2013-01-31" } }
            }"#,
        )
        .unwrap();
        assert!(matches!(
            config.reporting.date_range,
            Some(DateRange::Custom { .. })
        ));
    }
}
