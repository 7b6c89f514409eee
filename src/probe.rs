// src/probe.rs
//
//! Timed probes against the inference service.
//!
//! A probe never returns an error: connection failures, timeouts and
//! unexpected statuses all come back as a failed [`SampleOutcome`] with the
//! reason in `detail`. Only `200 OK` counts as success.

use reqwest::StatusCode;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, trace};

use crate::config::AppConfig;
use crate::http::{build_blocking_client, HttpClientConfig};
use crate::payload::PayloadPart;

/// Result of one timed attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleOutcome {
    pub success: bool,
    pub latency_ms: f64,
    /// Diagnostic fields (`status_code`, `error`, `batch_size`, ...)
    pub detail: BTreeMap<String, Value>,
}

impl SampleOutcome {
    pub fn ok(latency_ms: f64) -> Self {
        Self { success: true, latency_ms, detail: BTreeMap::new() }
    }

    pub fn failed(latency_ms: f64, error: impl Into<String>) -> Self {
        let mut detail = BTreeMap::new();
        detail.insert("error".to_string(), Value::String(error.into()));
        Self { success: false, latency_ms, detail }
    }

    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.detail.insert(key.to_string(), value);
        self
    }

    pub fn status_code(&self) -> Option<u16> {
        self.detail
            .get("status_code")
            .and_then(Value::as_u64)
            .and_then(|c| u16::try_from(c).ok())
    }
}

/// The two calls a check cycle makes against the service.
pub trait Probe {
    /// GET the health endpoint.
    fn health(&self) -> SampleOutcome;

    /// POST one inference request carrying `parts` and `form_fields`.
    fn infer(&self, parts: Vec<PayloadPart>, form_fields: &[(String, String)]) -> SampleOutcome;
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn describe_error(err: &reqwest::Error) -> SampleOutcome {
    SampleOutcome::failed(0.0, err.to_string())
        .with_detail("timeout", Value::Bool(err.is_timeout()))
        .with_detail("connect", Value::Bool(err.is_connect()))
}

fn from_status(status: StatusCode, latency_ms: f64) -> SampleOutcome {
    let outcome = if status == StatusCode::OK {
        SampleOutcome::ok(latency_ms)
    } else {
        SampleOutcome::failed(latency_ms, format!("unexpected status {status}"))
    };
    outcome.with_detail("status_code", json!(status.as_u16()))
}

/// Reads the whole response body before stopping the clock. A body that
/// stalls past the timeout or is cut short fails the sample.
fn complete_exchange(sent: reqwest::Result<Response>, start: Instant) -> SampleOutcome {
    let result = sent.and_then(|resp| {
        let status = resp.status();
        resp.bytes().map(|body| (status, body.len()))
    });
    let latency_ms = elapsed_ms(start);

    match result {
        Ok((status, body_len)) => {
            from_status(status, latency_ms).with_detail("response_bytes", json!(body_len))
        }
        Err(e) => {
            let mut outcome = describe_error(&e);
            outcome.latency_ms = latency_ms;
            outcome
        }
    }
}

/// Builds the multipart body. Text fields go first, then the file parts.
pub fn build_form(
    parts: Vec<PayloadPart>,
    form_fields: &[(String, String)],
) -> Result<Form, reqwest::Error> {
    let mut form = Form::new();
    for (name, value) in form_fields {
        form = form.text(name.clone(), value.clone());
    }
    for part in parts {
        let body = Part::bytes(part.content.to_vec())
            .file_name(part.file_name)
            .mime_str(part.mime_type)?;
        form = form.part(part.field_name, body);
    }
    Ok(form)
}

/// Probe backed by a blocking reqwest client.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    health_url: String,
    batch_url: String,
    batch_size: usize,
}

impl HttpProbe {
    pub fn new(
        client: Client,
        health_url: impl Into<String>,
        batch_url: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            client,
            health_url: health_url.into(),
            batch_url: batch_url.into(),
            batch_size,
        }
    }

    /// Probe for the configured service, timeouts from `monitoring`.
    pub fn from_config(cfg: &AppConfig, batch_size: usize) -> anyhow::Result<Self> {
        let client = build_blocking_client(&HttpClientConfig::from_app_config(cfg))?;
        Ok(Self::new(client, cfg.health_url(), cfg.batch_url(), batch_size))
    }

    pub fn health_url(&self) -> &str {
        &self.health_url
    }

    pub fn batch_url(&self) -> &str {
        &self.batch_url
    }
}

impl Probe for HttpProbe {
    fn health(&self) -> SampleOutcome {
        let start = Instant::now();
        let outcome = complete_exchange(self.client.get(&self.health_url).send(), start);
        trace!("health probe: {:?}", outcome);
        outcome
    }

    fn infer(&self, parts: Vec<PayloadPart>, form_fields: &[(String, String)]) -> SampleOutcome {
        let form = match build_form(parts, form_fields) {
            Ok(form) => form,
            Err(e) => {
                debug!("Could not build multipart body: {}", e);
                return describe_error(&e).with_detail("batch_size", json!(self.batch_size));
            }
        };

        let start = Instant::now();
        let sent = self.client.post(&self.batch_url).multipart(form).send();
        let outcome =
            complete_exchange(sent, start).with_detail("batch_size", json!(self.batch_size));
        trace!("inference probe: {:?}", outcome);
        outcome
    }
}
