//! Upstream MJPEG ingestion subsystem.
//!
//! # Data Flow
//! ```text
//! HttpSource::connect (GET + optional basic auth)
//!     → status / Content-Type checks, boundary extraction
//!     → ChunkParser over the response body
//!     → Producer task (next_frame loop)
//!     → bounded frame channel read by the broker
//! ```
//!
//! # Wire Format
//! ```text
//! --myboundary\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: 36291\r\n
//! \r\n
//! <36291 bytes of JPEG data>
//! ```
//!
//! # Design Decisions
//! - The boundary line is consumed but never validated; many cameras emit
//!   boundaries that do not match their Content-Type header
//! - A `Content-Length: 0` chunk is a clean end of stream, not an error
//! - The producer never retries; a new subscriber triggers a fresh connect

pub mod error;
pub mod parser;
pub mod producer;
pub mod source;

pub use error::ChunkerError;
pub use parser::{ChunkParser, Frame, UpstreamReader};
pub use producer::Producer;
pub use source::{Credentials, FrameSource, HttpSource};
