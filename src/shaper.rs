// src/shaper.rs
//
//! Request shaping: how the effective batch size reaches the inference
//! endpoint.
//!
//! * `multi-file` – one multipart part per batch element.
//! * `param`      – a single part plus a form field holding the batch size.
//! * anything else – a single part, batch size not communicated.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Request-shaping mode, read from `inference.mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InferenceMode {
    MultiFile,
    Param,
    /// Default / unrecognized values
    Single,
}

impl From<&str> for InferenceMode {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "multi-file" => InferenceMode::MultiFile,
            "param" => InferenceMode::Param,
            _ => InferenceMode::Single,
        }
    }
}

impl From<String> for InferenceMode {
    fn from(s: String) -> Self {
        InferenceMode::from(s.as_str())
    }
}

impl From<InferenceMode> for String {
    fn from(mode: InferenceMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for InferenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceMode::MultiFile => write!(f, "multi-file"),
            InferenceMode::Param => write!(f, "param"),
            InferenceMode::Single => write!(f, "single"),
        }
    }
}

/// What one inference request must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestShape {
    /// Number of payload parts to build
    pub part_count: usize,
    /// Auxiliary `(name, value)` form field, if any
    pub form_field: Option<(String, String)>,
}

impl RequestShape {
    pub fn form_fields(&self) -> &[(String, String)] {
        self.form_field.as_slice()
    }
}

/// Pure mapping from mode and batch size to the request shape.
pub fn shape_request(mode: InferenceMode, batch_size: usize, param_name: &str) -> RequestShape {
    match mode {
        InferenceMode::MultiFile => RequestShape {
            part_count: batch_size.max(1),
            form_field: None,
        },
        InferenceMode::Param => RequestShape {
            part_count: 1,
            form_field: Some((param_name.to_string(), batch_size.to_string())),
        },
        InferenceMode::Single => RequestShape {
            part_count: 1,
            form_field: None,
        },
    }
}
