//! Cloneable entry point to a broker.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::broker::subscriber::{
    Command, Subscriber, SubscriberId, Subscription, DELIVERY_CAPACITY,
};

/// Handle used by request handlers to reach a broker.
///
/// The broker loop runs until every handle and subscription is dropped.
#[derive(Debug, Clone)]
pub struct BrokerHandle {
    source: Arc<str>,
    commands: mpsc::UnboundedSender<Command>,
}

impl BrokerHandle {
    pub(crate) fn new(source: Arc<str>, commands: mpsc::UnboundedSender<Command>) -> Self {
        Self { source, commands }
    }

    /// Name of the source this broker relays.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Register a new subscriber for `remote_addr`.
    ///
    /// Frames arrive on the returned subscription until it is dropped or the
    /// upstream ends.
    pub fn subscribe(&self, remote_addr: impl Into<String>) -> Subscription {
        let id = SubscriberId::new();
        let (tx, rx) = mpsc::channel(DELIVERY_CAPACITY);

        let subscriber = Subscriber {
            id,
            remote_addr: remote_addr.into(),
            tx,
        };
        if self.commands.send(Command::Subscribe(subscriber)).is_err() {
            // Sender went down with the rejected command, so rx reports closed
            tracing::warn!(source = %self.source, "Broker is not running");
        }

        Subscription::new(id, rx, self.commands.clone())
    }
}
