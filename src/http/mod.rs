//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, one route per source)
//!     → stream.rs (method/query checks, subscribe to broker)
//!     → multipart.rs (re-frame each frame as a part)
//!     → Send to client, flushed per part
//! ```

pub mod multipart;
pub mod server;
pub mod stream;

pub use multipart::MultipartWriter;
pub use server::{HttpServer, ServerError};
pub use stream::{stream_handler, InvalidQuery, StreamParams, StreamState};
