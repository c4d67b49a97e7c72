//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Parse flags → Load config → Validate → Spawn brokers → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → End open streams → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Open MJPEG streams never finish on their own, so shutdown ends them
//!   explicitly instead of waiting for clients to leave

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
