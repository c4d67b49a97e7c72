//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check source URLs, paths and names are usable and unique
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::RelayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no sources configured")]
    NoSources,

    #[error("source #{0} has an empty name")]
    EmptyName(usize),

    #[error("source name '{0}' is used more than once")]
    DuplicateName(String),

    #[error("source '{name}' has an invalid url '{url}'")]
    InvalidUrl { name: String, url: String },

    #[error("source '{name}' path '{path}' must start with '/' and contain no route parameters")]
    InvalidPath { name: String, path: String },

    #[error("path '{0}' is served by more than one source")]
    DuplicatePath(String),

    #[error("source '{0}' has an invalid stream duration")]
    InvalidStreamDuration(String),

    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),

    #[error("invalid metrics address '{0}'")]
    InvalidMetricsAddress(String),

    #[error("invalid client address header '{0}'")]
    InvalidClientHeader(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.sources.is_empty() {
        errors.push(ValidationError::NoSources);
    }

    let mut names = HashSet::new();
    let mut paths = HashSet::new();
    for (i, source) in config.sources.iter().enumerate() {
        if source.name.trim().is_empty() {
            errors.push(ValidationError::EmptyName(i));
        } else if !names.insert(source.name.as_str()) {
            errors.push(ValidationError::DuplicateName(source.name.clone()));
        }

        let url_ok = Url::parse(&source.url)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !url_ok {
            errors.push(ValidationError::InvalidUrl {
                name: source.name.clone(),
                url: source.url.clone(),
            });
        }

        if !is_literal_path(&source.path) {
            errors.push(ValidationError::InvalidPath {
                name: source.name.clone(),
                path: source.path.clone(),
            });
        } else if !paths.insert(source.path.as_str()) {
            errors.push(ValidationError::DuplicatePath(source.path.clone()));
        }

        if !source.stream_duration_secs.is_finite() || source.stream_duration_secs < 0.0 {
            errors.push(ValidationError::InvalidStreamDuration(source.name.clone()));
        }
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if let Some(header) = &config.listener.client_address_header {
        if axum::http::HeaderName::from_bytes(header.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidClientHeader(header.clone()));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if config.broker.idle_grace_ms == 0 {
        errors.push(ValidationError::Zero("broker.idle_grace_ms"));
    }
    if config.upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::Zero("upstream.connect_timeout_secs"));
    }
    if config.upstream.max_frame_bytes == 0 {
        errors.push(ValidationError::Zero("upstream.max_frame_bytes"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Paths are served literally; axum would treat these segments as captures.
fn is_literal_path(path: &str) -> bool {
    path.starts_with('/')
        && !path.contains(['{', '}'])
        && !path
            .split('/')
            .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
}
