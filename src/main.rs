//! MJPEG relay
//!
//! Relays upstream MJPEG-over-HTTP camera streams to any number of clients
//! while holding a single upstream connection per source.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                     MJPEG RELAY                      │
//!                    │                                                      │
//!   Camera           │  ┌─────────┐   ┌─────────┐   ┌──────────────────┐    │   Clients
//!   ─────────────────┼─▶│ chunker │──▶│ broker  │──▶│ stream responder │────┼──▶ GET /cam
//!   multipart/       │  │ parser  │   │ fan-out │──▶│ stream responder │────┼──▶ GET /cam?fps=2
//!   x-mixed-replace  │  └─────────┘   └─────────┘   └──────────────────┘    │
//!                    │                                                      │
//!                    │  config · observability · lifecycle                  │
//!                    └──────────────────────────────────────────────────────┘
//! ```
//!
//! Run with `--config relay.toml` for several sources, or describe a single
//! source with `--source`, `--url` and friends.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use mjpeg_relay::config::{load_config, validate_config, ConfigError, RelayConfig, SourceConfig};
use mjpeg_relay::lifecycle::signals;
use mjpeg_relay::observability::{logging, metrics};
use mjpeg_relay::{HttpServer, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "mjpeg-relay", version)]
#[command(about = "Relay an MJPEG camera stream to many HTTP clients", long_about = None)]
struct Cli {
    /// TOML configuration file describing one or more sources
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Upstream MJPEG url
    #[arg(long, required_unless_present = "config")]
    source: Option<String>,

    /// Upstream basic auth username
    #[arg(long)]
    username: Option<String>,

    /// Upstream basic auth password
    #[arg(long)]
    password: Option<String>,

    /// Path the relayed stream is served on
    #[arg(long, default_value = "/")]
    url: String,

    /// Relay bind address (":8080" binds all interfaces)
    #[arg(long)]
    bind: Option<String>,

    /// Trusted header carrying the client address, e.g. X-Forwarded-For
    #[arg(long)]
    client_header: Option<String>,

    /// Maximum length of one client stream in seconds (0 = unlimited)
    #[arg(long, default_value_t = 0.0)]
    stream_duration: f64,

    /// Delay before the upstream is closed after the last client leaves
    #[arg(long)]
    stop_delay_ms: Option<u64>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics: Option<String>,
}

impl Cli {
    fn into_config(self) -> Result<RelayConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => {
                let mut config = RelayConfig::default();
                config.sources.push(SourceConfig {
                    name: "default".to_string(),
                    url: self.source.clone().unwrap_or_default(),
                    username: self.username.clone(),
                    password: self.password.clone(),
                    path: self.url.clone(),
                    stream_duration_secs: self.stream_duration,
                });
                config
            }
        };

        if let Some(bind) = &self.bind {
            config.listener.bind_address = normalize_bind(bind);
        }
        if let Some(header) = self.client_header {
            config.listener.client_address_header = Some(header);
        }
        if let Some(delay) = self.stop_delay_ms {
            config.broker.idle_grace_ms = delay;
        }
        if let Some(addr) = self.metrics {
            config.observability.metrics_enabled = true;
            config.observability.metrics_address = normalize_bind(&addr);
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

/// Accept the port-only form ":8080" as shorthand for all interfaces.
fn normalize_bind(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init(&config.observability.log_level);
    tracing::info!("mjpeg-relay v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        sources = config.sources.len(),
        idle_grace_ms = config.broker.idle_grace_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, shutdown.clone())?;

    tokio::spawn(async move {
        signals::wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
