// src/cycle.rs
//
//! One check cycle: health probe, `N` inference samples, aggregation,
//! snapshot persisted to the metrics log.
//!
//! [`Monitor`] is the context object built once at startup. It owns the
//! effective batch size (fixed for its lifetime) and the only state that
//! crosses cycles, the consecutive-failure counter.

use anyhow::Result;
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::benchmark::resolve_batch_size;
use crate::config::AppConfig;
use crate::metrics_log::MetricsLog;
use crate::payload::PayloadBuilder;
use crate::probe::{HttpProbe, Probe, SampleOutcome};
use crate::shaper::{shape_request, InferenceMode, RequestShape};
use crate::stats::CycleStats;

/// Logical phases of a cycle, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    ProbingHealth,
    Sampling,
    Aggregating,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CyclePhase::ProbingHealth => write!(f, "PROBING_HEALTH"),
            CyclePhase::Sampling => write!(f, "SAMPLING"),
            CyclePhase::Aggregating => write!(f, "AGGREGATING"),
        }
    }
}

/// When a cycle counts toward `consecutive_failures`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Failed health probe, or every inference sample failed. Any other
    /// cycle resets the counter.
    #[default]
    HealthOrTotalOutage,
    /// Counter stays at 0.
    Never,
}

impl FailurePolicy {
    pub fn cycle_failed(&self, health_ok: bool, stats: &CycleStats) -> bool {
        match self {
            FailurePolicy::HealthOrTotalOutage => !health_ok || stats.total_outage(),
            FailurePolicy::Never => false,
        }
    }
}

/// One persisted metrics record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// UTC, `YYYY-MM-DDTHH:MM:SSZ`
    #[serde(rename = "ts")]
    pub timestamp: String,
    /// Inference latencies in sample order
    pub response_times_ms: Vec<f64>,
    pub p95_latency_ms: f64,
    pub error_rate_percent: f64,
    pub health_ok: bool,
    pub consecutive_failures: u64,
    pub batch_size: usize,
}

fn utc_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Fixed per-run parameters of the cycle.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub batch_size: usize,
    pub mode: InferenceMode,
    pub batch_param_name: String,
    pub samples_per_check: usize,
    pub failure_policy: FailurePolicy,
}

impl CycleSettings {
    pub fn from_config(cfg: &AppConfig, batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            mode: cfg.inference.mode,
            batch_param_name: cfg.inference.batch_param_name.clone(),
            samples_per_check: cfg.monitoring.samples_per_check.max(1),
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn shape(&self) -> RequestShape {
        shape_request(self.mode, self.batch_size, &self.batch_param_name)
    }
}

/// Monitor context, one per process.
pub struct Monitor<P: Probe> {
    settings: CycleSettings,
    shape: RequestShape,
    probe: P,
    payloads: PayloadBuilder,
    sink: MetricsLog,
    rng: StdRng,
    consecutive_failures: u64,
}

impl Monitor<HttpProbe> {
    /// Build the production monitor: derives the batch size, opens the
    /// metrics log and the HTTP client.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let batch_size = resolve_batch_size(
            cfg.inference.benchmark_path(),
            cfg.inference.batch_size_fallback,
        );
        let settings = CycleSettings::from_config(cfg, batch_size);
        let probe = HttpProbe::from_config(cfg, settings.batch_size)?;
        let payloads = PayloadBuilder::new(
            cfg.inference.file_source_dir.clone(),
            cfg.inference.multipart_field_name.clone(),
        );
        let sink = MetricsLog::open(&cfg.logging.metrics_file)?;

        info!(
            "Monitor started: base_url={}, timeout={}s, samples={}, metrics_file={}",
            cfg.service.base_url,
            cfg.monitoring.request_timeout_seconds,
            settings.samples_per_check,
            sink.path().display()
        );
        info!("Endpoints: health={}, batch={}", probe.health_url(), probe.batch_url());
        info!("Inference mode={}, batch_size={}", settings.mode, settings.batch_size);
        debug!("Thresholds: {:?}", cfg.thresholds);

        Ok(Self::new(settings, probe, payloads, sink))
    }
}

impl<P: Probe> Monitor<P> {
    pub fn new(settings: CycleSettings, probe: P, payloads: PayloadBuilder, sink: MetricsLog) -> Self {
        let shape = settings.shape();
        Self {
            settings,
            shape,
            probe,
            payloads,
            sink,
            rng: StdRng::from_os_rng(),
            consecutive_failures: 0,
        }
    }

    /// Replace the payload RNG (deterministic sampling in tests).
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.settings.failure_policy = policy;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.settings.batch_size
    }

    pub fn shape(&self) -> &RequestShape {
        &self.shape
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Run one full cycle. Sample failures only show up in the snapshot;
    /// the sole error path is a failed write to the metrics log.
    pub fn run_check_once(&mut self) -> Result<MetricSnapshot> {
        debug!("Cycle phase {}", CyclePhase::ProbingHealth);
        let health = self.probe.health();
        if !health.success {
            warn!("Health probe failed: {:?}", health.detail);
        }

        debug!("Cycle phase {}", CyclePhase::Sampling);
        let outcomes: Vec<SampleOutcome> = (0..self.settings.samples_per_check)
            .map(|i| {
                let parts = self.payloads.build(self.shape.part_count, &mut self.rng);
                let outcome = self.probe.infer(parts, self.shape.form_fields());
                debug!(
                    "Sample {}: success={} latency={:.2}ms",
                    i + 1,
                    outcome.success,
                    outcome.latency_ms
                );
                outcome
            })
            .collect();

        debug!("Cycle phase {}", CyclePhase::Aggregating);
        let latencies: Vec<f64> = outcomes.iter().map(|o| o.latency_ms).collect();
        let successes: Vec<bool> = outcomes.iter().map(|o| o.success).collect();
        let stats = CycleStats::compute(&latencies, &successes);

        if self.settings.failure_policy.cycle_failed(health.success, &stats) {
            self.consecutive_failures += 1;
        } else {
            self.consecutive_failures = 0;
        }

        let snapshot = MetricSnapshot {
            timestamp: utc_timestamp(),
            response_times_ms: latencies,
            p95_latency_ms: stats.p95_latency_ms,
            error_rate_percent: stats.error_rate_percent,
            health_ok: health.success,
            consecutive_failures: self.consecutive_failures,
            batch_size: self.settings.batch_size,
        };
        self.sink.append(&snapshot)?;

        info!(
            "Check done: health_ok={} p95={:.2}ms error_rate={:.1}% ok={}/{} consecutive_failures={}",
            snapshot.health_ok,
            snapshot.p95_latency_ms,
            snapshot.error_rate_percent,
            stats.successes,
            stats.successes + stats.failures,
            snapshot.consecutive_failures
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PayloadPart;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    /// Replays scripted outcomes and records what it was asked to send.
    #[derive(Default)]
    struct ScriptedProbe {
        health: RefCell<VecDeque<bool>>,
        infer: RefCell<VecDeque<bool>>,
        sent: RefCell<Vec<(usize, Vec<(String, String)>)>>,
    }

    impl ScriptedProbe {
        fn new(health: &[bool], infer: &[bool]) -> Self {
            Self {
                health: RefCell::new(health.iter().copied().collect()),
                infer: RefCell::new(infer.iter().copied().collect()),
                sent: RefCell::default(),
            }
        }
    }

    impl Probe for ScriptedProbe {
        fn health(&self) -> SampleOutcome {
            match self.health.borrow_mut().pop_front().unwrap_or(true) {
                true => SampleOutcome::ok(1.0),
                false => SampleOutcome::failed(10_000.0, "operation timed out"),
            }
        }

        fn infer(&self, parts: Vec<PayloadPart>, form_fields: &[(String, String)]) -> SampleOutcome {
            self.sent.borrow_mut().push((parts.len(), form_fields.to_vec()));
            let n = self.sent.borrow().len() as f64;
            match self.infer.borrow_mut().pop_front().unwrap_or(true) {
                true => SampleOutcome::ok(n * 10.0),
                false => SampleOutcome::failed(n * 10.0, "connection refused"),
            }
        }
    }

    fn settings(mode: InferenceMode, batch_size: usize, samples: usize) -> CycleSettings {
        CycleSettings {
            batch_size,
            mode,
            batch_param_name: "batch_size".into(),
            samples_per_check: samples,
            failure_policy: FailurePolicy::default(),
        }
    }

    fn monitor(
        dir: &TempDir,
        settings: CycleSettings,
        probe: ScriptedProbe,
    ) -> Monitor<ScriptedProbe> {
        let sink = MetricsLog::open(dir.path().join("metrics.jsonl")).unwrap();
        Monitor::new(settings, probe, PayloadBuilder::new("", "files"), sink)
            .with_rng(StdRng::seed_from_u64(11))
    }

    #[test]
    fn health_timeout_with_healthy_samples() {
        let dir = TempDir::new().unwrap();
        let probe = ScriptedProbe::new(&[false], &[true, true, true]);
        let mut mon = monitor(&dir, settings(InferenceMode::Single, 1, 3), probe);

        let snap = mon.run_check_once().unwrap();
        assert!(!snap.health_ok);
        assert_eq!(snap.error_rate_percent, 0.0);
        assert_eq!(snap.response_times_ms, vec![10.0, 20.0, 30.0]);
        assert_eq!(snap.p95_latency_ms, 30.0);
        assert_eq!(snap.consecutive_failures, 1);
    }

    #[test]
    fn multi_file_sends_batch_parts() {
        let dir = TempDir::new().unwrap();
        let probe = ScriptedProbe::new(&[], &[]);
        let mut mon = monitor(&dir, settings(InferenceMode::MultiFile, 4, 2), probe);

        mon.run_check_once().unwrap();
        let sent = mon.probe().sent.borrow();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(parts, fields)| *parts == 4 && fields.is_empty()));
    }

    #[test]
    fn param_mode_sends_one_part_and_field() {
        let dir = TempDir::new().unwrap();
        let probe = ScriptedProbe::new(&[], &[]);
        let mut mon = monitor(&dir, settings(InferenceMode::Param, 8, 1), probe);

        mon.run_check_once().unwrap();
        let sent = mon.probe().sent.borrow();
        assert_eq!(sent[0].0, 1);
        assert_eq!(sent[0].1, vec![("batch_size".to_string(), "8".to_string())]);
    }

    #[test]
    fn error_rate_and_counter_progression() {
        let dir = TempDir::new().unwrap();
        // cycle 1: one of three fails; cycle 2: all fail; cycle 3: all fail; cycle 4: healthy
        let probe = ScriptedProbe::new(
            &[true, true, true, true],
            &[true, false, true, false, false, false, false, false, false, true, true, true],
        );
        let mut mon = monitor(&dir, settings(InferenceMode::Single, 1, 3), probe);

        let first = mon.run_check_once().unwrap();
        assert_eq!(first.error_rate_percent, 100.0 / 3.0);
        assert_eq!(first.consecutive_failures, 0);

        assert_eq!(mon.run_check_once().unwrap().consecutive_failures, 1);
        let third = mon.run_check_once().unwrap();
        assert_eq!(third.error_rate_percent, 100.0);
        assert_eq!(third.consecutive_failures, 2);
        assert_eq!(mon.run_check_once().unwrap().consecutive_failures, 0);
    }

    #[test]
    fn never_policy_keeps_counter_at_zero() {
        let dir = TempDir::new().unwrap();
        let probe = ScriptedProbe::new(&[false, false], &[false, false]);
        let mut mon = monitor(&dir, settings(InferenceMode::Single, 1, 1), probe)
            .with_failure_policy(FailurePolicy::Never);
        mon.run_check_once().unwrap();
        assert_eq!(mon.run_check_once().unwrap().consecutive_failures, 0);
    }

    #[test]
    fn each_cycle_appends_one_record_with_same_schema() {
        let dir = TempDir::new().unwrap();
        let probe = ScriptedProbe::new(&[], &[]);
        let mut mon = monitor(&dir, settings(InferenceMode::MultiFile, 2, 3), probe);

        mon.run_check_once().unwrap();
        mon.run_check_once().unwrap();

        let text = std::fs::read_to_string(dir.path().join("metrics.jsonl")).unwrap();
        let records: Vec<serde_json::Value> =
            text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(records.len(), 2);

        let keys = |v: &serde_json::Value| {
            v.as_object().unwrap().keys().cloned().collect::<Vec<_>>()
        };
        assert_eq!(keys(&records[0]), keys(&records[1]));
        for key in [
            "ts",
            "response_times_ms",
            "p95_latency_ms",
            "error_rate_percent",
            "health_ok",
            "consecutive_failures",
            "batch_size",
        ] {
            assert!(records[0].get(key).is_some(), "missing {key}");
        }
        assert_eq!(records[0]["batch_size"], records[1]["batch_size"]);

        let snap: MetricSnapshot = serde_json::from_value(records[1].clone()).unwrap();
        assert!(snap.timestamp.ends_with('Z'));
        assert_eq!(snap.timestamp.len(), "2025-01-01T00:00:00Z".len());
    }

    #[test]
    fn phases_render_like_state_names() {
        assert_eq!(CyclePhase::ProbingHealth.to_string(), "PROBING_HEALTH");
        assert_eq!(CyclePhase::Aggregating.to_string(), "AGGREGATING");
    }
}
