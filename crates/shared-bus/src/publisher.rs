//! # Gossip Publisher
//!
//! Defines the publishing side of the bus.

use crate::events::TopicMessage;
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Trait for publishing payloads to the bus.
#[async_trait]
pub trait GossipPublisher: Send + Sync {
    /// Publish a payload on a topic.
    ///
    /// # Returns
    ///
    /// The number of active subscriptions the message was delivered to. The
    /// count includes subscriptions to other topics, which discard it.
    async fn publish(&self, topic: &str, data: Vec<u8>) -> usize;

    /// Get the total number of messages published.
    fn messages_published(&self) -> u64;
}

/// In-memory implementation of the gossip bus.
///
/// Uses `tokio::sync::broadcast` for multi-producer, multi-consumer semantics.
/// Suitable for single-process operation; a networked deployment swaps in a
/// peer-to-peer implementation behind the same trait.
pub struct InMemoryGossipBus {
    /// Broadcast sender for messages.
    sender: broadcast::Sender<TopicMessage>,

    /// Total messages published.
    messages_published: AtomicU64,

    /// Channel capacity.
    capacity: usize,
}

impl InMemoryGossipBus {
    /// Create a new in-memory bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            messages_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to messages on one topic.
    #[must_use]
    pub fn subscribe(&self, topic: &str) -> Subscription {
        debug!(topic, "New subscription created");
        Subscription::new(self.sender.subscribe(), topic)
    }

    /// Get the number of active subscribers across all topics.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryGossipBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GossipPublisher for InMemoryGossipBus {
    async fn publish(&self, topic: &str, data: Vec<u8>) -> usize {
        let len = data.len();
        self.messages_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(TopicMessage::new(topic, data)) {
            Ok(receivers) => {
                trace!(topic, bytes = len, receivers, "Message published");
                receivers
            }
            Err(_) => {
                debug!(topic, bytes = len, "Message dropped (no subscribers)");
                0
            }
        }
    }

    fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }
}
