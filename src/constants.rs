// src/constants.rs
//
// Centralized defaults for inferwatch so config, payload and probe code agree

/// Default service host
pub const DEFAULT_SERVICE_HOST: &str = "localhost";

/// Default service port
pub const DEFAULT_SERVICE_PORT: u16 = 8000;

/// Default base URL of the inference service
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default health endpoint path (GET, no body)
pub const DEFAULT_HEALTH_ENDPOINT: &str = "/health";

/// Default batch inference endpoint path (POST, multipart)
pub const DEFAULT_BATCH_ENDPOINT: &str = "/predict_batch";

/// Seconds between two check cycles when running as a daemon
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 30;

/// Inference samples issued per check cycle
pub const DEFAULT_SAMPLES_PER_CHECK: usize = 3;

/// Per-request timeout (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Console log file written next to the metrics log
pub const DEFAULT_LOG_FILE: &str = "logs/monitoring.log";

/// Append-only JSONL metrics log
pub const DEFAULT_METRICS_FILE: &str = "logs/metrics.jsonl";

/// Benchmark table consulted once at startup for the batch size
pub const DEFAULT_BENCHMARK_CSV: &str = "results/optimization_results.csv";

/// Batch size used when the benchmark table cannot supply one
pub const DEFAULT_BATCH_SIZE_FALLBACK: usize = 1;

/// Benchmark rows claiming a larger batch are treated as malformed
pub const MAX_BENCHMARK_BATCH_SIZE: usize = 65_536;

/// Multipart field that carries the image parts
pub const DEFAULT_MULTIPART_FIELD: &str = "files";

/// Form field that carries the batch size in `param` mode
pub const DEFAULT_BATCH_PARAM_NAME: &str = "batch_size";

/// Config file used when neither `-c` nor `MONITORING_CONFIG` is given
pub const DEFAULT_CONFIG_PATH: &str = "config/monitoring_config.yaml";

/// Environment variable overriding the config path
pub const CONFIG_PATH_ENV: &str = "MONITORING_CONFIG";

/// Environment variable overriding the log level
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

// ============================================================================
// Synthetic payload constants
// ============================================================================

/// Width/height of a synthesized image (pixels)
pub const SYNTHETIC_IMAGE_SIDE: u32 = 64;

/// RGB
pub const SYNTHETIC_IMAGE_CHANNELS: usize = 3;

/// JPEG start-of-image marker, sent when no encoder is available
pub const JPEG_STUB: &[u8] = &[0xFF, 0xD8, 0xFF];

/// Image extensions picked up from a payload source directory
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_PNG: &str = "image/png";

// ============================================================================
// Statistics constants
// ============================================================================

/// Percentile reported in every snapshot
pub const REPORTED_PERCENTILE: f64 = 95.0;
