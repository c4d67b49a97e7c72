//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunker::parser::DEFAULT_MAX_FRAME_BYTES;

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address, client address header).
    pub listener: ListenerConfig,

    /// Upstream MJPEG sources, one route each.
    pub sources: Vec<SourceConfig>,

    /// Broker lifecycle settings.
    pub broker: BrokerConfig,

    /// Upstream connection settings shared by all sources.
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Trusted header carrying the client address (e.g., "X-Forwarded-For").
    pub client_address_header: Option<String>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            client_address_header: None,
        }
    }
}

/// A single upstream MJPEG source.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Source identifier for logging/metrics.
    pub name: String,

    /// Upstream MJPEG URL.
    pub url: String,

    /// Basic auth username.
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password.
    #[serde(default)]
    pub password: Option<String>,

    /// Path the relayed stream is served on.
    ///
    /// Matched exactly, except that a path ending in `/` also serves every
    /// path below it (`/` serves all requests not claimed by another source).
    #[serde(default = "default_path")]
    pub path: String,

    /// Maximum length of one client stream in seconds (0 = unlimited).
    #[serde(default)]
    pub stream_duration_secs: f64,
}

fn default_path() -> String {
    "/".to_string()
}

impl SourceConfig {
    /// Per-client stream limit, `None` when unlimited.
    pub fn stream_duration(&self) -> Option<Duration> {
        if self.stream_duration_secs > 0.0 {
            Duration::try_from_secs_f64(self.stream_duration_secs).ok()
        } else {
            None
        }
    }
}

/// Broker lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Delay before the upstream is closed once the last client leaves.
    pub idle_grace_ms: u64,
}

impl BrokerConfig {
    pub fn idle_grace(&self) -> Duration {
        Duration::from_millis(self.idle_grace_ms)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            idle_grace_ms: 60_000,
        }
    }
}

/// Upstream connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Time allowed for connecting and receiving response headers.
    pub connect_timeout_secs: u64,

    /// Largest accepted frame in bytes.
    pub max_frame_bytes: usize,
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
