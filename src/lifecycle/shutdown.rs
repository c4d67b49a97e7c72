//! Shutdown coordination for the relay.

use tokio_util::sync::CancellationToken;

/// Relay-wide shutdown signal.
///
/// Clones share one signal. The HTTP server stops accepting on it and every
/// open stream ends with its closing delimiter, so the drain completes even
/// though MJPEG responses never finish on their own.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal every holder. Later calls are no-ops.
    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("Shutdown triggered");
            self.token.cancel();
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once `trigger` has been called on any clone.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }
}
