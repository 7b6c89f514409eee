// src/http/mod.rs
//
// HTTP client support for the probes

pub mod client;

pub use client::{build_blocking_client, HttpClientConfig};
