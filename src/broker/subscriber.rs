//! Subscriber identity and delivery channels.

use std::fmt;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::chunker::Frame;

/// Capacity of a subscriber's delivery channel.
pub(crate) const DELIVERY_CAPACITY: usize = 1;

/// Unique key of a subscription inside a broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messages accepted by the broker loop.
#[derive(Debug)]
pub(crate) enum Command {
    Subscribe(Subscriber),
    Unsubscribe(SubscriberId),
}

/// The broker's view of a subscriber: identity plus the sending half.
///
/// Dropping it closes the delivery channel, which the owning
/// `Subscription` observes as end of stream.
#[derive(Debug)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub remote_addr: String,
    pub(crate) tx: mpsc::Sender<Frame>,
}

/// The client's side of a subscription.
///
/// Dropping it unsubscribes from the broker, whatever the exit path.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    frames: mpsc::Receiver<Frame>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriberId,
        frames: mpsc::Receiver<Frame>,
        commands: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            id,
            frames,
            commands,
        }
    }

    /// Wait for the next frame. `None` means the stream has ended.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Broker already gone during shutdown
        let _ = self.commands.send(Command::Unsubscribe(self.id));
    }
}
