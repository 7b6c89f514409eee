// src/lib.rs
//
// Crate root: health/load monitor for a remote inference service.
//
// Each check cycle probes `/health`, sends a configurable number of
// synthetic batch inference requests, and appends a latency/error snapshot
// to a JSONL metrics log.

pub mod constants;
pub mod config;

// Sampling engine
pub mod benchmark;
pub mod payload;
pub mod shaper;
pub mod probe;
pub mod stats;
pub mod cycle;

// I/O plumbing
pub mod http;
pub mod metrics_log;
pub mod logging;

pub use benchmark::{resolve_batch_size, select_batch_size, BenchmarkError, BenchmarkRow, BenchmarkTable};
pub use config::{load_config, resolve_config_path, AppConfig, ConfigError};
pub use cycle::{CyclePhase, CycleSettings, FailurePolicy, MetricSnapshot, Monitor};
pub use metrics_log::MetricsLog;
pub use payload::{PayloadBuilder, PayloadPart, PayloadSource};
pub use probe::{HttpProbe, Probe, SampleOutcome};
pub use shaper::{shape_request, InferenceMode, RequestShape};
pub use stats::{error_rate_percent, p95_latency_ms, percentile_nearest_rank, CycleStats};
