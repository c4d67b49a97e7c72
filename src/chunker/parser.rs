//! Multipart chunk parser.
//!
//! # Responsibilities
//! - Consume one boundary line per chunk (tolerating non-conformant ones)
//! - Read part headers up to the blank line and extract Content-Length
//! - Read exactly Content-Length bytes as the frame payload
//!
//! # Design Decisions
//! - Header and line sizes are capped so a broken upstream cannot make us
//!   buffer unbounded data
//! - Blank lines before the boundary (the CRLF ending the previous body) are
//!   skipped rather than taken as the boundary itself

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::chunker::error::ChunkerError;

/// One JPEG image extracted from the upstream stream.
pub type Frame = Bytes;

/// Type-erased upstream body.
pub type UpstreamReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Default upper bound for a single frame.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

const MAX_HEADER_LINES: usize = 64;
const MAX_LINE_BYTES: u64 = 8 * 1024;

/// Turns a multipart byte stream into frames.
pub struct ChunkParser<R = UpstreamReader> {
    reader: R,
    boundary: String,
    max_frame_bytes: usize,
    line: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> ChunkParser<R> {
    /// Create a parser for a body whose Content-Type announced `boundary`.
    pub fn new(reader: R, boundary: impl Into<String>) -> Self {
        Self {
            reader,
            boundary: boundary.into(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            line: Vec::with_capacity(128),
        }
    }

    /// Override the maximum accepted Content-Length.
    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` when the upstream signals the end of the stream,
    /// either with a zero-length chunk or a closing boundary.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, ChunkerError> {
        if self.read_boundary().await? {
            return Ok(None);
        }

        let size = self.read_headers().await?;
        if size == 0 {
            tracing::debug!("Received final chunk");
            return Ok(None);
        }
        if size > self.max_frame_bytes {
            return Err(ChunkerError::Framing(format!(
                "Content-Length {} exceeds limit of {} bytes",
                size, self.max_frame_bytes
            )));
        }

        let mut data = BytesMut::zeroed(size);
        self.reader.read_exact(&mut data).await?;
        Ok(Some(data.freeze()))
    }

    /// Consume the boundary line. Returns true on a closing boundary.
    async fn read_boundary(&mut self) -> Result<bool, ChunkerError> {
        let mut skipped = 0;
        loop {
            let line = self.read_line().await?;
            if !line.is_empty() {
                break;
            }
            skipped += 1;
            if skipped > MAX_HEADER_LINES {
                return Err(ChunkerError::Framing("boundary line not found".into()));
            }
        }

        let line = trim_line_end(&self.line);
        let token = self.boundary.as_bytes();
        if let Some(head) = line.strip_suffix(b"--") {
            if !token.is_empty() && head.ends_with(token) {
                tracing::debug!("Received closing boundary");
                return Ok(true);
            }
        }

        // AXIS and friends send boundaries that do not match the header
        if !contains(line, token) {
            tracing::trace!(
                boundary = %self.boundary,
                line = %String::from_utf8_lossy(line),
                "Non-conformant boundary line"
            );
        }
        Ok(false)
    }

    /// Read header lines up to the blank line and return Content-Length.
    async fn read_headers(&mut self) -> Result<usize, ChunkerError> {
        let mut size = None;
        let mut lines = 0;
        loop {
            let line = self.read_line().await?;
            if line.is_empty() {
                break;
            }

            lines += 1;
            if lines > MAX_HEADER_LINES {
                return Err(ChunkerError::Framing("too many chunk header lines".into()));
            }

            if let Some(n) = content_length(line)? {
                size = Some(n);
            }
        }

        size.ok_or_else(|| ChunkerError::Framing("Content-Length chunk header not found".into()))
    }

    /// Read one line and return it without the trailing CRLF.
    async fn read_line(&mut self) -> Result<&[u8], ChunkerError> {
        self.line.clear();
        let n = (&mut self.reader)
            .take(MAX_LINE_BYTES)
            .read_until(b'\n', &mut self.line)
            .await?;

        if !self.line.ends_with(b"\n") {
            if n as u64 == MAX_LINE_BYTES {
                return Err(ChunkerError::Framing("chunk header line too long".into()));
            }
            return Err(ChunkerError::UnexpectedEof);
        }

        Ok(trim_line_end(&self.line))
    }
}

/// Parse a `Content-Length` header line; other headers yield `None`.
fn content_length(line: &[u8]) -> Result<Option<usize>, ChunkerError> {
    let Ok(text) = std::str::from_utf8(line) else {
        return Ok(None);
    };
    let Some((name, value)) = text.split_once(':') else {
        return Ok(None);
    };
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return Ok(None);
    }

    let value = value.trim();
    value
        .parse()
        .map(Some)
        .map_err(|_| ChunkerError::Framing(format!("invalid Content-Length {:?}", value)))
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\r' | b'\n') {
        end -= 1;
    }
    &line[..end]
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}
