//! # In-Memory Transport
//!
//! [`QueryTransport`] over the shared gossip bus.

use crate::domain::errors::TransportError;
use crate::ports::outbound::{MessageStream, QueryTransport};
use async_trait::async_trait;
use shared_bus::{GossipPublisher, InMemoryGossipBus};
use std::sync::Arc;
use tracing::trace;

/// Publishes and subscribes through an [`InMemoryGossipBus`].
#[derive(Clone)]
pub struct InMemoryTransport {
    bus: Arc<InMemoryGossipBus>,
}

impl InMemoryTransport {
    pub fn new(bus: Arc<InMemoryGossipBus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<InMemoryGossipBus> {
        &self.bus
    }
}

#[async_trait]
impl QueryTransport for InMemoryTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        // Zero receivers is not an error: gossip is fire-and-forget.
        let receivers = self.bus.publish(topic, payload).await;
        trace!(topic, receivers, "Envelope published");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<MessageStream, TransportError> {
        Ok(Box::pin(self.bus.subscribe(topic).into_stream()))
    }
}
