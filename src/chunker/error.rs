//! Upstream error definitions.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that end (or prevent) an upstream producer run.
#[derive(Debug, Error)]
pub enum ChunkerError {
    /// Transport-level failure reaching the upstream.
    #[error("connection to upstream failed: {0}")]
    Connection(#[from] reqwest::Error),

    /// Upstream did not answer with response headers in time.
    #[error("upstream did not respond within {0:?}")]
    ConnectTimeout(Duration),

    /// Upstream answered with a status other than 200.
    #[error("upstream request failed ({0})")]
    Upstream(StatusCode),

    /// Malformed multipart framing or Content-Type.
    #[error("malformed multipart stream: {0}")]
    Framing(String),

    /// Upstream closed the connection in the middle of a chunk.
    #[error("upstream closed the stream unexpectedly")]
    UnexpectedEof,

    /// Read failure on the upstream body.
    #[error("upstream read failed: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for ChunkerError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => ChunkerError::UnexpectedEof,
            _ => ChunkerError::Io(err),
        }
    }
}
