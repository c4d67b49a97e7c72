//! MJPEG relay library.
//!
//! Republishes upstream `multipart/x-mixed-replace` camera streams to any
//! number of HTTP clients while keeping a single upstream connection per
//! source.

pub mod broker;
pub mod chunker;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::RelayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
