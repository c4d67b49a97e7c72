//! Broker control loop.
//!
//! # Responsibilities
//! - Track subscribers of one source
//! - Start the upstream producer on demand, stop it after the idle grace delay
//! - Fan frames out without blocking on slow subscribers
//! - Close every subscriber when the producer ends or fails to start

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{self, Instant};

use crate::broker::handle::BrokerHandle;
use crate::broker::subscriber::{Command, Subscriber, SubscriberId};
use crate::chunker::{ChunkerError, Frame, FrameSource, Producer};
use crate::observability::metrics;

/// Far enough away to never fire while disarmed.
const DISARMED: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Pub/sub actor for a single upstream source.
pub struct Broker<S> {
    name: Arc<str>,
    source: S,
    idle_grace: Duration,
    subscribers: HashMap<SubscriberId, Subscriber>,
    producer: Option<Producer>,
}

impl<S: FrameSource> Broker<S> {
    /// Spawn the broker loop and return a handle to it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(name: impl Into<Arc<str>>, source: S, idle_grace: Duration) -> BrokerHandle {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let broker = Self {
            name: name.clone(),
            source,
            idle_grace,
            subscribers: HashMap::new(),
            producer: None,
        };
        tokio::spawn(broker.run(rx));

        BrokerHandle::new(name, tx)
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!(source = %self.name, "Broker started");

        let idle = time::sleep(DISARMED);
        tokio::pin!(idle);
        let mut idle_armed = false;

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Subscribe(subscriber)) => {
                        idle_armed = false;
                        self.subscribe(subscriber).await;
                    }
                    Some(Command::Unsubscribe(id)) => {
                        if self.unsubscribe(id) {
                            idle.as_mut().reset(Instant::now() + self.idle_grace);
                            idle_armed = true;
                        }
                    }
                    None => break,
                },

                frame = next_frame(&mut self.producer) => match frame {
                    Some(frame) => self.publish(frame),
                    None => {
                        idle_armed = false;
                        self.producer_ended();
                    }
                },

                _ = &mut idle, if idle_armed => {
                    idle_armed = false;
                    self.idle_timeout();
                }
            }
        }

        self.stop_producer();
        tracing::debug!(source = %self.name, "Broker stopped");
    }

    async fn subscribe(&mut self, subscriber: Subscriber) {
        let id = subscriber.id;
        let client = subscriber.remote_addr.clone();
        self.subscribers.insert(id, subscriber);

        tracing::info!(
            source = %self.name,
            subscriber = %id,
            client = %client,
            subscribers = self.subscribers.len(),
            "Subscriber added"
        );
        metrics::set_subscribers(&self.name, self.subscribers.len());

        if self.producer.is_none() {
            if let Err(e) = self.start_producer().await {
                tracing::warn!(source = %self.name, error = %e, "Failed to start chunker");
                self.close_subscribers();
            }
        }
    }

    /// Returns true when the last subscriber left while a producer runs.
    fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        // Already gone if the producer closed everyone
        let Some(subscriber) = self.subscribers.remove(&id) else {
            return false;
        };

        tracing::info!(
            source = %self.name,
            subscriber = %id,
            client = %subscriber.remote_addr,
            subscribers = self.subscribers.len(),
            "Subscriber removed"
        );
        metrics::set_subscribers(&self.name, self.subscribers.len());

        self.subscribers.is_empty() && self.producer.is_some()
    }

    fn publish(&mut self, frame: Frame) {
        metrics::record_frame_published(&self.name);

        for subscriber in self.subscribers.values() {
            match subscriber.tx.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::trace!(
                        source = %self.name,
                        subscriber = %subscriber.id,
                        "Subscriber not ready, frame dropped"
                    );
                    metrics::record_frame_dropped(&self.name);
                }
                // Receiver dropped; its unsubscribe is already queued
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }

    fn idle_timeout(&mut self) {
        if self.subscribers.is_empty() {
            tracing::info!(source = %self.name, "No subscribers left");
            self.stop_producer();
        }
    }

    fn producer_ended(&mut self) {
        tracing::info!(
            source = %self.name,
            subscribers = self.subscribers.len(),
            "Chunker ended, closing subscribers"
        );
        self.producer = None;
        self.close_subscribers();
    }

    async fn start_producer(&mut self) -> Result<(), ChunkerError> {
        tracing::info!(source = %self.name, "Starting chunker");

        let parser = match self.source.connect().await {
            Ok(parser) => parser,
            Err(e) => {
                metrics::record_upstream_connect(&self.name, false);
                return Err(e);
            }
        };
        metrics::record_upstream_connect(&self.name, true);

        self.producer = Some(Producer::spawn(self.name.clone(), parser));
        Ok(())
    }

    fn stop_producer(&mut self) {
        if let Some(producer) = self.producer.take() {
            tracing::info!(source = %self.name, "Stopping chunker");
            producer.stop();
        }
    }

    /// Drop every sending half, ending all subscriber streams.
    fn close_subscribers(&mut self) {
        self.subscribers.clear();
        metrics::set_subscribers(&self.name, 0);
    }
}

async fn next_frame(producer: &mut Option<Producer>) -> Option<Frame> {
    match producer {
        Some(producer) => producer.next().await,
        None => std::future::pending().await,
    }
}
