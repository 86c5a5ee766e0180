//! Streamer configuration.
//!
//! Loaded once at startup from YAML, with `${VAR}` / `$VAR` environment references
//! substituted before parsing, then validated as a whole. The resulting value is
//! passed by reference into every constructor; nothing reads it globally.

use std::env;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::provider::YAHOO_CHART_BASE_URL;
use crate::publisher::event_bus::{DEFAULT_EVENT_SOURCE, DEFAULT_EVENT_TYPE};
use crate::retry::{Backoff, RetryConfig};
use crate::{CircuitBreakerConfig, Symbol, ValidationError};

const ENV_REFERENCE: &str = r"\$\{(\w+)\}|\$(\w+)";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid environment reference pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Staging,
    Prod,
    Integration,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format with colors.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
    /// Single-line, less verbose than pretty.
    Compact,
}

impl LogFormat {
    /// Parse from string (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| format!("unknown log format: {value}"))
    }
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
            Self::Compact => "compact",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub environment: Environment,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: String::from("quotestream"),
            environment: Environment::Dev,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub max_requests_per_hour: u32,
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub acquire_timeout_ms: Option<u64>,
    pub max_workers: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            max_requests_per_hour: 2000,
            base_url: YAHOO_CHART_BASE_URL.to_owned(),
            request_timeout_ms: 10_000,
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 10_000,
            acquire_timeout_ms: None,
            max_workers: crate::worker::DEFAULT_MAX_WORKERS,
        }
    }
}

impl ProviderConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(self.initial_backoff_ms),
                factor: 2.0,
                max: Duration::from_millis(self.max_backoff_ms),
                jitter: false,
            },
            ..RetryConfig::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub open_timeout_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout_secs: 60,
        }
    }
}

impl BreakerSettings {
    pub fn to_config(self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            open_timeout: Duration::from_secs(self.open_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
    pub circuit_breaker: BreakerSettings,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: String::from("http://localhost:8000"),
            timeout_secs: 30,
            circuit_breaker: BreakerSettings::default(),
        }
    }
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    pub enabled: bool,
    pub url: String,
    pub channel: String,
    pub event_type: String,
    pub event_source: String,
    pub circuit_breaker: BreakerSettings,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: String::from("redis://localhost:6379"),
            channel: String::from("quotes-stream"),
            event_type: DEFAULT_EVENT_TYPE.to_owned(),
            event_source: DEFAULT_EVENT_SOURCE.to_owned(),
            circuit_breaker: BreakerSettings {
                failure_threshold: 5,
                open_timeout_secs: 30,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: LogFormat::Pretty,
        }
    }
}

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    pub service: ServiceConfig,
    pub symbols: Vec<String>,
    pub polling_interval_secs: u64,
    pub provider: ProviderConfig,
    pub storage: StorageConfig,
    pub event_bus: EventBusConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            symbols: ["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA"]
                .into_iter()
                .map(String::from)
                .collect(),
            polling_interval_secs: 5,
            provider: ProviderConfig::default(),
            storage: StorageConfig::default(),
            event_bus: EventBusConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl StreamerConfig {
    pub fn symbols(&self) -> Result<Vec<Symbol>, ValidationError> {
        self.symbols.iter().map(|symbol| Symbol::parse(symbol)).collect()
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    /// Checks every field and reports all failures at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.symbols.is_empty() {
            errors.push(String::from("symbols: at least one symbol is required"));
        }
        for symbol in &self.symbols {
            if let Err(error) = Symbol::parse(symbol) {
                errors.push(format!("symbols: {error}"));
            }
        }
        if !(1..=300).contains(&self.polling_interval_secs) {
            errors.push(format!(
                "polling_interval_secs: {} is outside 1..=300",
                self.polling_interval_secs
            ));
        }

        let provider = &self.provider;
        if provider.max_requests_per_hour == 0 {
            errors.push(String::from("provider.max_requests_per_hour: must be at least 1"));
        }
        if provider.max_attempts == 0 {
            errors.push(String::from("provider.max_attempts: must be at least 1"));
        }
        if provider.max_workers == 0 {
            errors.push(String::from("provider.max_workers: must be at least 1"));
        }
        if provider.initial_backoff_ms > provider.max_backoff_ms {
            errors.push(String::from(
                "provider.initial_backoff_ms: must not exceed max_backoff_ms",
            ));
        }
        check_http_url("provider.base_url", &provider.base_url, &mut errors);

        if self.storage.enabled {
            check_http_url("storage.base_url", &self.storage.base_url, &mut errors);
            if self.storage.timeout_secs == 0 {
                errors.push(String::from("storage.timeout_secs: must be at least 1"));
            }
            check_breaker("storage.circuit_breaker", self.storage.circuit_breaker, &mut errors);
        }

        if self.event_bus.enabled {
            let url = &self.event_bus.url;
            if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
                errors.push(format!("event_bus.url: '{url}' must use redis:// or rediss://"));
            }
            if self.event_bus.channel.trim().is_empty() {
                errors.push(String::from("event_bus.channel: must not be empty"));
            }
            check_breaker(
                "event_bus.circuit_breaker",
                self.event_bus.circuit_breaker,
                &mut errors,
            );
        }

        if self.metrics.enabled && self.metrics.port < 1024 {
            errors.push(format!(
                "metrics.port: {} is outside 1024..=65535",
                self.metrics.port
            ));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            errors.push(format!(
                "logging.level: '{}' must be one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn check_http_url(field: &str, url: &str, errors: &mut Vec<String>) {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        errors.push(format!("{field}: '{url}' must use http:// or https://"));
    }
}

fn check_breaker(field: &str, settings: BreakerSettings, errors: &mut Vec<String>) {
    if let Err(error) = settings.to_config().validate() {
        errors.push(format!("{field}: {error}"));
    }
}

/// Replaces `${VAR}` and `$VAR` with environment values. Unset variables are left in place.
pub fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let pattern = Regex::new(ENV_REFERENCE)?;
    let mut missing = Vec::new();

    let substituted = pattern.replace_all(content, |caps: &Captures<'_>| {
        let placeholder = caps.get(0).map_or("", |m| m.as_str());
        let Some(name) = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()) else {
            return placeholder.to_owned();
        };
        match env::var(name) {
            Ok(value) => {
                debug!(variable = name, "substituting environment variable");
                value
            }
            Err(_) => {
                missing.push(name.to_owned());
                placeholder.to_owned()
            }
        }
    });

    if !missing.is_empty() {
        warn!(variables = ?missing, "environment variables referenced by config are not set");
    }
    Ok(substituted.into_owned())
}

/// Substitutes, parses, and validates a YAML document.
pub fn parse_config(content: &str) -> Result<StreamerConfig, ConfigError> {
    let substituted = substitute_env_vars(content)?;
    let config: StreamerConfig = serde_yaml::from_str(&substituted)?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: impl AsRef<Path>) -> Result<StreamerConfig, ConfigError> {
    let path = path.as_ref();
    info!(path = %path.display(), "loading configuration");

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&content)?;

    info!(
        symbols = config.symbols.len(),
        environment = ?config.service.environment,
        "configuration loaded"
    );
    Ok(config)
}
