//! Transport seam
//!
//! The orchestrator and the players only ever talk through a transport
//! with string topics and JSON payloads: a [`Bus`] to publish on and an
//! [`Inbox`] to receive from. The crate ships [`LocalBus`], an in-process
//! implementation over a tokio broadcast channel whose [`Subscription`]s are
//! inboxes, which is what the demo binary and the integration tests run on.
//!
//! A network broker client plugs in by implementing [`Bus`] for its publish
//! side and either implementing [`Inbox`] or forwarding the envelopes it
//! receives into an mpsc channel, whose receiver is an [`Inbox`] as well.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::message::Outgoing;

/// Errors raised by a transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// A message could not be published
    #[error("failed to publish on {topic}: {reason}")]
    Publish {
        /// Full topic name
        topic: String,
        /// Transport-specific description of the failure
        reason: String,
    },
    /// The connection to the transport is gone
    #[error("transport disconnected")]
    Disconnected,
}

/// A publish/subscribe transport
pub trait Bus {
    /// Publishes a payload on a full topic name
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the transport refused the message.
    fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError>;

    /// Encodes and publishes a message under `prefix`
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the transport refused the message.
    fn send(&self, prefix: &str, message: &Outgoing) -> Result<(), TransportError> {
        self.publish(&message.topic().path(prefix), &message.to_payload())
    }
}

impl<B: Bus + ?Sized> Bus for &B {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError> {
        (**self).publish(topic, payload)
    }
}

impl<B: Bus + ?Sized> Bus for Arc<B> {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError> {
        (**self).publish(topic, payload)
    }
}

/// A message as it travels on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Full topic name
    pub topic: String,
    /// JSON payload
    pub payload: String,
}

/// The receiving side of a transport
pub trait Inbox {
    /// Waits for the next message addressed to this receiver
    ///
    /// # Returns
    ///
    /// `None` once the transport is closed
    fn recv(&mut self) -> impl Future<Output = Option<Envelope>> + Send;
}

impl Inbox for mpsc::Receiver<Envelope> {
    fn recv(&mut self) -> impl Future<Output = Option<Envelope>> + Send {
        mpsc::Receiver::recv(self)
    }
}

impl Inbox for mpsc::UnboundedReceiver<Envelope> {
    fn recv(&mut self) -> impl Future<Output = Option<Envelope>> + Send {
        mpsc::UnboundedReceiver::recv(self)
    }
}

/// In-process bus backed by a tokio broadcast channel
///
/// Every subscription sees every message and filters by topic. A
/// subscriber that falls more than the channel capacity behind loses the
/// oldest messages, which mirrors the best-effort delivery of a real broker.
#[derive(Debug, Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<Envelope>,
}

impl LocalBus {
    /// Creates a bus buffering up to `capacity` messages per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to a set of full topic names
    ///
    /// Only messages published after this call are received.
    pub fn subscribe<I, S>(&self, topics: I) -> Subscription
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Subscription {
            topics: topics.into_iter().map(Into::into).collect(),
            receiver: self.sender.subscribe(),
        }
    }
}

impl Bus for LocalBus {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError> {
        // no subscriber is not a failure: nobody was listening
        let _ = self.sender.send(Envelope {
            topic: topic.to_owned(),
            payload: payload.to_owned(),
        });
        Ok(())
    }
}

/// A topic-filtered receiving end of a [`LocalBus`]
#[derive(Debug)]
pub struct Subscription {
    topics: Vec<String>,
    receiver: broadcast::Receiver<Envelope>,
}

impl Subscription {
    /// Waits for the next message on one of the subscribed topics
    ///
    /// # Returns
    ///
    /// `None` once every sender of the bus is dropped
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if self.topics.contains(&envelope.topic) => return Some(envelope),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber lagged behind, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Inbox for Subscription {
    fn recv(&mut self) -> impl Future<Output = Option<Envelope>> + Send {
        Subscription::recv(self)
    }
}
