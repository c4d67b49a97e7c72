//! Per-client stream responder.
//!
//! # Responsibilities
//! - Validate method and query, derive the client address
//! - Subscribe to the source broker for the lifetime of the response
//! - Re-frame every delivered frame as a fresh multipart part
//! - Apply the optional fps throttle and stream duration limit
//!
//! # Design Decisions
//! - Response headers are only sent once the first frame (or the duration
//!   limit) arrives, so an unreachable upstream still yields a 503
//! - Unsubscribing is tied to `Subscription::drop`, which covers client
//!   disconnects where the body stream is simply dropped

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, Query, Request, State},
    http::{header, HeaderName, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::{stream, Stream};
use thiserror::Error;
use tokio::time::{sleep_until, Instant};

use crate::broker::{BrokerHandle, Subscription};
use crate::chunker::Frame;
use crate::http::multipart::MultipartWriter;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Stand-in for "no duration limit".
const UNLIMITED: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Per-route state of a relayed source.
#[derive(Debug, Clone)]
pub struct StreamState {
    pub broker: BrokerHandle,
    pub stream_duration: Option<Duration>,
    pub client_address_header: Option<HeaderName>,
    pub shutdown: Shutdown,
}

/// Query parameters accepted on a stream route.
#[derive(Debug, Default, PartialEq)]
pub struct StreamParams {
    /// Maximum frames per second for this client.
    pub fps: Option<String>,
}

/// The request query could not be decoded.
#[derive(Debug, Error)]
#[error("invalid query: {0}")]
pub struct InvalidQuery(String);

impl StreamParams {
    /// Decode the query string of `uri`.
    ///
    /// Malformed percent-escapes are rejected. Repeated keys are allowed and
    /// the first value wins.
    pub fn from_uri(uri: &Uri) -> Result<Self, InvalidQuery> {
        let query = uri.query().unwrap_or_default();
        if has_invalid_escape(query) {
            return Err(InvalidQuery(format!("malformed percent-escape in '{}'", query)));
        }

        let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(uri)
            .map_err(|e| InvalidQuery(e.body_text()))?;
        let fps = pairs
            .into_iter()
            .find(|(key, _)| key == "fps")
            .map(|(_, value)| value);

        Ok(Self { fps })
    }
}

fn has_invalid_escape(query: &str) -> bool {
    let bytes = query.as_bytes();
    let hex = |i: usize| bytes.get(i).is_some_and(u8::is_ascii_hexdigit);
    bytes
        .iter()
        .enumerate()
        .any(|(i, &b)| b == b'%' && !(hex(i + 1) && hex(i + 2)))
}

/// Why a stream stopped before the client went away.
#[derive(Debug, Clone, Copy)]
enum StreamEnd {
    UpstreamClosed,
    DurationReached,
    Shutdown,
}

enum FirstEvent {
    Frame(Frame),
    Expired,
    Closed,
}

/// Serve one client of a relayed source.
pub async fn stream_handler(State(state): State<StreamState>, request: Request) -> Response {
    let method = request.method().clone();
    if method != Method::GET && method != Method::HEAD {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET, HEAD")],
            format!("HTTP method {} not supported", method),
        )
            .into_response();
    }

    // Allow client to lower the frame rate
    let params = match StreamParams::from_uri(request.uri()) {
        Ok(params) => params,
        Err(e) => {
            tracing::debug!(error = %e, "Rejecting malformed query");
            return (StatusCode::BAD_REQUEST, "Invalid query").into_response();
        }
    };
    let send_interval = params.fps.as_deref().and_then(parse_send_interval);

    let client = client_address(&request, state.client_address_header.as_ref());
    let source = state.broker.source().to_owned();
    tracing::info!(
        source = %source,
        client = %client,
        send_interval = ?send_interval,
        "Client connected"
    );

    let mut subscription = state.broker.subscribe(client.clone());
    let deadline = Instant::now() + state.stream_duration.unwrap_or(UNLIMITED);

    let first = tokio::select! {
        frame = subscription.recv() => match frame {
            Some(frame) => FirstEvent::Frame(frame),
            None => FirstEvent::Closed,
        },
        _ = sleep_until(deadline) => FirstEvent::Expired,
        _ = state.shutdown.wait() => FirstEvent::Closed,
    };

    let pending = match first {
        FirstEvent::Frame(frame) => Some(frame),
        FirstEvent::Expired => None,
        FirstEvent::Closed => {
            tracing::warn!(source = %source, client = %client, "Stream failed");
            return (StatusCode::SERVICE_UNAVAILABLE, "Stream failed").into_response();
        }
    };

    let writer = MultipartWriter::new();
    let headers = [
        (header::CONTENT_TYPE, writer.content_type()),
        (header::CACHE_CONTROL, "no-cache".to_string()),
    ];

    if method == Method::HEAD {
        return (StatusCode::OK, headers).into_response();
    }

    let responder = FrameResponder {
        source,
        client,
        subscription,
        writer,
        send_interval,
        last_sent: None,
        deadline,
        shutdown: state.shutdown.clone(),
        pending,
        queued: None,
        finished: false,
    };

    (StatusCode::OK, headers, Body::from_stream(responder.into_stream())).into_response()
}

/// Minimum time between frames for an `fps` value, `None` disables throttling.
pub fn parse_send_interval(fps: &str) -> Option<Duration> {
    let fps: f64 = fps.trim().parse().ok()?;
    if !fps.is_finite() || fps <= 0.0 {
        return None;
    }

    Duration::try_from_secs_f64(1.0 / fps)
        .ok()
        .filter(|interval| !interval.is_zero())
}

/// Address identifying the client in logs.
///
/// The trusted header wins when present; its first comma-separated entry
/// is the original client.
pub fn client_address(request: &Request, trusted_header: Option<&HeaderName>) -> String {
    let forwarded = trusted_header
        .and_then(|name| request.headers().get(name))
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if let Some(addr) = forwarded {
        return addr.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Body state of one streaming response.
struct FrameResponder {
    source: String,
    client: String,
    subscription: Subscription,
    writer: MultipartWriter,
    send_interval: Option<Duration>,
    last_sent: Option<Instant>,
    deadline: Instant,
    shutdown: Shutdown,
    /// Frame received before the headers went out.
    pending: Option<Frame>,
    /// Payload following an already emitted part header.
    queued: Option<Frame>,
    finished: bool,
}

impl FrameResponder {
    fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
        stream::unfold(self, |mut responder| async move {
            let chunk = responder.next_chunk().await?;
            Some((Ok(chunk), responder))
        })
    }

    async fn next_chunk(&mut self) -> Option<Bytes> {
        if let Some(payload) = self.queued.take() {
            return Some(payload);
        }
        if self.finished {
            return None;
        }

        loop {
            let frame = match self.pending.take() {
                Some(frame) => frame,
                None => match self.wait_for_frame().await {
                    Ok(frame) => frame,
                    Err(reason) => {
                        tracing::info!(
                            source = %self.source,
                            client = %self.client,
                            reason = ?reason,
                            "Stream ended"
                        );
                        self.finished = true;
                        return Some(self.writer.close());
                    }
                },
            };

            if self.throttled() {
                metrics::record_frame_skipped(&self.source);
                continue;
            }

            self.last_sent = Some(Instant::now());
            metrics::record_frame_sent(&self.source);

            let header = self.writer.part_header(frame.len());
            self.queued = Some(frame);
            return Some(header);
        }
    }

    /// Next frame, or the reason the stream should end.
    async fn wait_for_frame(&mut self) -> Result<Frame, StreamEnd> {
        tokio::select! {
            frame = self.subscription.recv() => frame.ok_or(StreamEnd::UpstreamClosed),
            _ = sleep_until(self.deadline) => Err(StreamEnd::DurationReached),
            _ = self.shutdown.wait() => Err(StreamEnd::Shutdown),
        }
    }

    fn throttled(&self) -> bool {
        match (self.send_interval, self.last_sent) {
            (Some(interval), Some(last)) => last.elapsed() < interval,
            _ => false,
        }
    }
}

impl Drop for FrameResponder {
    fn drop(&mut self) {
        // Body dropped before the closing delimiter went out
        if !self.finished {
            tracing::info!(source = %self.source, client = %self.client, "Client disconnected");
        }
    }
}
