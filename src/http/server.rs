//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Spawn one broker per configured source
//! - Create the Axum Router with one stream route per source
//! - Wire up middleware (tracing)
//! - Serve until shutdown, then end every open stream

use std::net::SocketAddr;

use axum::{http::HeaderName, routing::any, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::broker::Broker;
use crate::chunker::{ChunkerError, Credentials, HttpSource};
use crate::config::{RelayConfig, SourceConfig};
use crate::http::stream::{stream_handler, StreamState};
use crate::lifecycle::Shutdown;

/// Errors raised while assembling the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("source '{name}' has an invalid url: {source}")]
    InvalidUrl {
        name: String,
        source: url::ParseError,
    },

    #[error("invalid client address header: {0}")]
    InvalidHeader(#[from] axum::http::header::InvalidHeaderName),

    #[error("failed to build upstream client: {0}")]
    Upstream(#[from] ChunkerError),
}

/// HTTP server relaying every configured source.
pub struct HttpServer {
    router: Router,
    sources: usize,
    shutdown: Shutdown,
}

impl HttpServer {
    /// Create the server and spawn one broker per source.
    ///
    /// Open streams end when `shutdown` is triggered. Must be called from
    /// within a Tokio runtime.
    pub fn new(config: &RelayConfig, shutdown: Shutdown) -> Result<Self, ServerError> {
        let client_address_header = config
            .listener
            .client_address_header
            .as_deref()
            .map(|name| HeaderName::from_bytes(name.as_bytes()))
            .transpose()?;

        let mut router = Router::new();
        for source in &config.sources {
            let upstream = http_source(source, config)?;
            tracing::info!(
                source = %source.name,
                url = %upstream.url(),
                path = %source.path,
                "Relaying source"
            );

            let state = StreamState {
                broker: Broker::spawn(source.name.as_str(), upstream, config.broker.idle_grace()),
                stream_duration: source.stream_duration(),
                client_address_header: client_address_header.clone(),
                shutdown: shutdown.clone(),
            };
            let handler = any(stream_handler).with_state(state);

            // A trailing slash serves the whole subtree
            if source.path.ends_with('/') {
                router = router.route(&format!("{}{{*rest}}", source.path), handler.clone());
            }
            router = router.route(&source.path, handler);
        }

        let router = router.layer(TraceLayer::new_for_http());
        Ok(Self {
            router,
            sources: config.sources.len(),
            shutdown,
        })
    }

    /// The assembled router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections until shutdown is triggered.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, sources = self.sources, "HTTP server starting");

        let shutdown = self.shutdown;
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.wait().await;
                tracing::info!("Shutdown signal received, ending streams");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn http_source(source: &SourceConfig, config: &RelayConfig) -> Result<HttpSource, ServerError> {
    let url = Url::parse(&source.url).map_err(|e| ServerError::InvalidUrl {
        name: source.name.clone(),
        source: e,
    })?;

    let credentials = source
        .username
        .as_ref()
        .filter(|username| !username.is_empty())
        .map(|username| Credentials {
            username: username.clone(),
            password: source.password.clone(),
        });

    Ok(HttpSource::new(url, credentials, &config.upstream)?)
}
