// src/config.rs
//
// Typed monitor configuration, loaded from YAML.
// Every field carries a default so partial files are fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::constants::*;
use crate::shaper::InferenceMode;

/// Validation failures for an otherwise well-formed config file.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("monitoring.samples_per_check must be >= 1")]
    NoSamples,

    #[error("monitoring.request_timeout_seconds must be >= 1")]
    ZeroTimeout,

    #[error("service.base_url must not be empty")]
    EmptyBaseUrl,

    #[error("inference.multipart_field_name must not be empty")]
    EmptyFieldName,
}

/// Where the inference service lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Base URL; the trailing `/` is stripped on load.
    pub base_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVICE_HOST.to_string(),
            port: DEFAULT_SERVICE_PORT,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Cycle cadence and per-request limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub check_interval_seconds: u64,
    pub samples_per_check: usize,
    pub request_timeout_seconds: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: DEFAULT_CHECK_INTERVAL_SECS,
            samples_per_check: DEFAULT_SAMPLES_PER_CHECK,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl MonitoringConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }
}

/// Endpoint paths, relative to `service.base_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub health: String,
    pub batch: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            health: DEFAULT_HEALTH_ENDPOINT.to_string(),
            batch: DEFAULT_BATCH_ENDPOINT.to_string(),
        }
    }
}

/// A warning/critical pair. Either side may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdLevels {
    pub warning: Option<f64>,
    pub critical: Option<f64>,
}

/// Alerting thresholds. Carried for downstream consumers; the monitor itself
/// only reports them at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub response_time_ms: ThresholdLevels,
    pub p95_latency_ms: ThresholdLevels,
    pub error_rate_percent: ThresholdLevels,
    pub consecutive_failures: ThresholdLevels,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub enabled: bool,
    pub cooldown_minutes: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self { enabled: true, cooldown_minutes: 5 }
    }
}

/// Log destinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub console_colors: bool,
    pub log_file: PathBuf,
    pub metrics_file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            console_colors: true,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            metrics_file: PathBuf::from(DEFAULT_METRICS_FILE),
        }
    }
}

/// How synthetic inference requests are shaped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Benchmark table used to pick the batch size (empty = none)
    pub load_batch_from_csv: String,
    /// Batch size when the table is absent or unusable
    pub batch_size_fallback: usize,
    pub mode: InferenceMode,
    pub multipart_field_name: String,
    /// Form field carrying the batch size in `param` mode
    pub batch_param_name: String,
    /// Payload source: empty = synthesize, directory = sample, file = replicate
    pub file_source_dir: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            load_batch_from_csv: DEFAULT_BENCHMARK_CSV.to_string(),
            batch_size_fallback: DEFAULT_BATCH_SIZE_FALLBACK,
            mode: InferenceMode::MultiFile,
            multipart_field_name: DEFAULT_MULTIPART_FIELD.to_string(),
            batch_param_name: DEFAULT_BATCH_PARAM_NAME.to_string(),
            file_source_dir: String::new(),
        }
    }
}

impl InferenceConfig {
    /// Benchmark table path, `None` when blank.
    pub fn benchmark_path(&self) -> Option<&Path> {
        let trimmed = self.load_batch_from_csv.trim();
        (!trimmed.is_empty()).then(|| Path::new(trimmed))
    }
}

/// Full monitor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub monitoring: MonitoringConfig,
    pub endpoints: EndpointsConfig,
    pub thresholds: Thresholds,
    pub alerts: AlertsConfig,
    pub logging: LoggingConfig,
    pub inference: InferenceConfig,
}

impl AppConfig {
    /// Parse YAML text, normalize and validate it.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let mut cfg: AppConfig = if text.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(text).context("Failed to parse monitor config YAML")?
        };
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    fn normalize(&mut self) {
        let trimmed = self.service.base_url.trim().trim_end_matches('/');
        self.service.base_url = trimmed.to_string();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitoring.samples_per_check == 0 {
            return Err(ConfigError::NoSamples);
        }
        if self.monitoring.request_timeout_seconds == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.service.base_url.is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        if self.inference.multipart_field_name.trim().is_empty() {
            return Err(ConfigError::EmptyFieldName);
        }
        Ok(())
    }

    /// Absolute URL for an endpoint path.
    pub fn endpoint_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.service.base_url, path)
        } else {
            format!("{}/{}", self.service.base_url, path)
        }
    }

    pub fn health_url(&self) -> String {
        self.endpoint_url(&self.endpoints.health)
    }

    pub fn batch_url(&self) -> String {
        self.endpoint_url(&self.endpoints.batch)
    }
}

/// Load and validate a config file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    AppConfig::from_yaml_str(&text)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Pick the config path: explicit flag, then `MONITORING_CONFIG`, then the default.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
