//! Background task that drives a `ChunkParser`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chunker::parser::{ChunkParser, Frame};

/// Frames buffered between the read loop and the broker.
const FRAME_BUFFER: usize = 1;

/// A running upstream read loop.
///
/// The read loop owns the connection; stopping the producer (or dropping
/// it) makes the loop exit and close the connection.
pub struct Producer {
    frames: mpsc::Receiver<Frame>,
    cancel: CancellationToken,
}

impl Producer {
    /// Spawn the read loop for `parser`.
    pub fn spawn(source: Arc<str>, parser: ChunkParser) -> Self {
        let (tx, frames) = mpsc::channel(FRAME_BUFFER);
        let cancel = CancellationToken::new();

        tokio::spawn(read_loop(source, parser, tx, cancel.clone()));

        Self { frames, cancel }
    }

    /// Next frame, or `None` once the read loop has ended.
    pub async fn next(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }

    /// Ask the read loop to stop. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn read_loop(
    source: Arc<str>,
    mut parser: ChunkParser,
    tx: mpsc::Sender<Frame>,
    cancel: CancellationToken,
) {
    tracing::info!(source = %source, "Chunker starting");

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = parser.next_frame() => result,
        };

        match result {
            Ok(Some(frame)) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = tx.send(frame) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            Ok(None) => {
                tracing::info!(source = %source, "Chunker received final chunk");
                break;
            }
            Err(e) => {
                tracing::warn!(source = %source, error = %e, "Chunker failed");
                break;
            }
        }
    }

    tracing::info!(source = %source, "Chunker stopping");
}
