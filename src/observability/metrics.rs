//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mjpeg_relay_subscribers` (gauge): active subscribers per source
//! - `mjpeg_relay_upstream_connects_total` (counter): connect attempts by result
//! - `mjpeg_relay_frames_published_total` (counter): frames read from upstream
//! - `mjpeg_relay_frames_dropped_total` (counter): frames skipped for slow subscribers
//! - `mjpeg_relay_frames_sent_total` (counter): frames written to clients
//! - `mjpeg_relay_frames_skipped_total` (counter): frames held back by fps throttling

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn set_subscribers(source: &str, count: usize) {
    metrics::gauge!("mjpeg_relay_subscribers", "source" => source.to_owned()).set(count as f64);
}

pub fn record_upstream_connect(source: &str, success: bool) {
    let result = if success { "ok" } else { "error" };
    metrics::counter!(
        "mjpeg_relay_upstream_connects_total",
        "source" => source.to_owned(),
        "result" => result
    )
    .increment(1);
}

pub fn record_frame_published(source: &str) {
    metrics::counter!("mjpeg_relay_frames_published_total", "source" => source.to_owned())
        .increment(1);
}

pub fn record_frame_dropped(source: &str) {
    metrics::counter!("mjpeg_relay_frames_dropped_total", "source" => source.to_owned())
        .increment(1);
}

pub fn record_frame_sent(source: &str) {
    metrics::counter!("mjpeg_relay_frames_sent_total", "source" => source.to_owned())
        .increment(1);
}

pub fn record_frame_skipped(source: &str) {
    metrics::counter!("mjpeg_relay_frames_skipped_total", "source" => source.to_owned())
        .increment(1);
}
