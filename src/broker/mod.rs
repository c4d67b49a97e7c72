//! Publish/subscribe broker subsystem.
//!
//! One broker runs per configured source. It is an actor: every state change
//! goes through a single task, so the subscriber set and the producer handle
//! need no locking.
//!
//! # Data Flow
//! ```text
//! BrokerHandle::subscribe ──Command::Subscribe──┐
//! Subscription::drop ─────Command::Unsubscribe──┤
//!                                               ▼
//! Producer frames ───────────────────────▶ Broker::run ──try_send──▶ Subscription
//! idle timer ───────────────────────────────────┘        (drop if full)
//! ```
//!
//! # Design Decisions
//! - Upstream connects lazily on the first subscriber and disconnects after
//!   an idle grace delay with no subscribers
//! - Fan-out never waits on a subscriber; slow clients lose frames
//! - Control commands are polled before frames so membership is always
//!   current when a frame is published

pub mod actor;
pub mod handle;
pub mod subscriber;

pub use actor::Broker;
pub use handle::BrokerHandle;
pub use subscriber::{Subscriber, SubscriberId, Subscription};
