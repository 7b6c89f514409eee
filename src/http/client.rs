// src/http/client.rs
//
// Blocking HTTP client used by the probes

use anyhow::{Context, Result};
use std::time::Duration;
use reqwest::blocking::{Client, ClientBuilder};
use tracing::debug;

use crate::config::AppConfig;

/// HTTP client configuration for health/inference probes
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whole-request timeout; bounds the wait of every probe
    pub request_timeout: Duration,
    /// Idle connections kept per host. Zero forces a fresh connection per
    /// probe so each latency includes connection setup.
    pub max_idle_per_host: usize,
    /// TCP keepalive settings
    pub tcp_keepalive: Option<Duration>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            max_idle_per_host: 1,
            tcp_keepalive: Some(Duration::from_secs(60)),
        }
    }
}

impl HttpClientConfig {
    /// Both timeouts follow `monitoring.request_timeout_seconds`.
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        let timeout = cfg.monitoring.request_timeout();
        Self {
            connect_timeout: timeout,
            request_timeout: timeout,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self.request_timeout = timeout;
        self
    }
}

/// Build a blocking reqwest client from `config`.
pub fn build_blocking_client(config: &HttpClientConfig) -> Result<Client> {
    let mut builder = ClientBuilder::new()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .pool_max_idle_per_host(config.max_idle_per_host)
        .tcp_nodelay(true); // Disable Nagle's algorithm for lower latency

    if let Some(keepalive) = config.tcp_keepalive {
        builder = builder.tcp_keepalive(keepalive);
    }

    debug!("Building HTTP client: {:?}", config);
    builder.build().context("Failed to build HTTP client")
}
