//! Upstream connection.
//!
//! # Responsibilities
//! - Issue the upstream GET with optional basic authentication
//! - Reject non-200 responses and non-multipart Content-Types
//! - Hand the response body to a `ChunkParser`

use std::future::Future;
use std::time::Duration;

use futures_util::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tokio_util::io::StreamReader;
use url::Url;

use crate::chunker::error::ChunkerError;
use crate::chunker::parser::{ChunkParser, UpstreamReader};
use crate::config::UpstreamConfig;

const MIXED_REPLACE: &str = "multipart/x-mixed-replace";

/// Something the broker can open a frame stream from.
pub trait FrameSource: Send + Sync + 'static {
    /// Open a new upstream connection and return a parser over its body.
    fn connect(&self) -> impl Future<Output = Result<ChunkParser, ChunkerError>> + Send;
}

/// Basic authentication credentials for the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

/// MJPEG source reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    url: Url,
    credentials: Option<Credentials>,
    client: reqwest::Client,
    connect_timeout: Duration,
    max_frame_bytes: usize,
}

impl HttpSource {
    /// Create a source for `url`.
    pub fn new(
        url: Url,
        credentials: Option<Credentials>,
        config: &UpstreamConfig,
    ) -> Result<Self, ChunkerError> {
        let connect_timeout = config.connect_timeout();
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            url,
            credentials,
            client,
            connect_timeout,
            max_frame_bytes: config.max_frame_bytes,
        })
    }

    /// Upstream URL.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl FrameSource for HttpSource {
    async fn connect(&self) -> Result<ChunkParser, ChunkerError> {
        let mut request = self.client.get(self.url.clone());
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, credentials.password.as_ref());
        }

        let response = tokio::time::timeout(self.connect_timeout, request.send())
            .await
            .map_err(|_| ChunkerError::ConnectTimeout(self.connect_timeout))??;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ChunkerError::Upstream(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let boundary = parse_boundary(content_type)?;

        tracing::debug!(url = %self.url, boundary = %boundary, "Upstream connected");

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let reader: UpstreamReader = Box::new(StreamReader::new(Box::pin(body)));
        Ok(ChunkParser::new(reader, boundary).with_max_frame_bytes(self.max_frame_bytes))
    }
}

/// Extract the boundary token from a `multipart/x-mixed-replace` Content-Type.
pub fn parse_boundary(content_type: &str) -> Result<String, ChunkerError> {
    let invalid = || ChunkerError::Framing(format!("Content-Type is invalid ({})", content_type));

    let mut params = content_type.split(';');
    let media_type = params.next().unwrap_or_default().trim();
    if !media_type.eq_ignore_ascii_case(MIXED_REPLACE) {
        return Err(invalid());
    }

    params
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|boundary| !boundary.is_empty())
        .map(str::to_owned)
        .ok_or_else(invalid)
}
