//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::DecodeOptions;

/// Root configuration for a pRPC server.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration.
    pub listener: ListenerConfig,

    /// Request limits.
    pub limits: LimitsConfig,

    /// Body codec settings.
    pub codec: CodecConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Per-request limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted request body in bytes.
    pub max_body_size: usize,

    /// Cap on the timeout a caller may request, in seconds.
    pub max_timeout_secs: Option<u64>,
}

impl LimitsConfig {
    pub fn max_timeout(&self) -> Option<Duration> {
        self.max_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 4 * 1024 * 1024,
            max_timeout_secs: None,
        }
    }
}

/// Body codec settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CodecConfig {
    /// Ignore JSON fields the request message does not define.
    pub discard_unknown_json_fields: bool,
}

impl CodecConfig {
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            discard_unknown_fields: self.discard_unknown_json_fields,
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            discard_unknown_json_fields: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines instead of human-readable text.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
