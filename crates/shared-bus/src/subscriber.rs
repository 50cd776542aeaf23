//! # Topic Subscriber
//!
//! Defines the subscription side of the bus.

use crate::events::TopicMessage;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The bus was closed.
    #[error("Gossip bus closed")]
    Closed,
}

/// A subscription handle for receiving payloads on one topic.
pub struct Subscription {
    /// The broadcast receiver.
    receiver: broadcast::Receiver<TopicMessage>,

    /// Topic this subscription listens on.
    topic: String,
}

impl Subscription {
    /// Create a new subscription.
    pub(crate) fn new(receiver: broadcast::Receiver<TopicMessage>, topic: &str) -> Self {
        Self {
            receiver,
            topic: topic.to_string(),
        }
    }

    /// Receive the next payload on this topic.
    ///
    /// # Returns
    ///
    /// - `Some(data)` - The next payload
    /// - `None` - The channel was closed (bus dropped)
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        loop {
            let message = match self.receiver.recv().await {
                Ok(m) => m,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(topic = %self.topic, lagged = count, "Subscriber lagged, some messages dropped");
                    continue;
                }
            };

            if message.is_on(&self.topic) {
                return Some(message.data.to_vec());
            }
        }
    }

    /// Try to receive the next payload without blocking.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(data))` - A payload was available
    /// - `Ok(None)` - No payload available (would block)
    /// - `Err(SubscriptionError::Closed)` - The channel was closed
    pub fn try_recv(&mut self) -> Result<Option<Vec<u8>>, SubscriptionError> {
        loop {
            let message = match self.receiver.try_recv() {
                Ok(m) => m,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };

            if message.is_on(&self.topic) {
                return Ok(Some(message.data.to_vec()));
            }
        }
    }

    /// Get the topic for this subscription.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Convert into a lazy stream of payloads.
    ///
    /// The stream ends when the bus is dropped and cannot be restarted.
    #[must_use]
    pub fn into_stream(self) -> TopicStream {
        TopicStream::new(self)
    }
}

/// A stream of payloads for one topic.
///
/// Implements `tokio_stream::Stream` for use with stream combinators.
pub struct TopicStream {
    inner: Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>,
}

impl TopicStream {
    /// Create a new stream from a subscription.
    #[must_use]
    pub fn new(subscription: Subscription) -> Self {
        let Subscription { receiver, topic } = subscription;
        let inner = BroadcastStream::new(receiver).filter_map(move |item| match item {
            Ok(message) if message.is_on(&topic) => Some(message.data.to_vec()),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(count)) => {
                debug!(topic = %topic, lagged = count, "Stream lagged, some messages dropped");
                None
            }
        });
        Self {
            inner: Box::pin(inner),
        }
    }
}

impl Stream for TopicStream {
    type Item = Vec<u8>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}
