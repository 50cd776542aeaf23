//! # Outbound Ports (Driven Ports / SPI)
//!
//! Traits that define what the verifier needs from its environment.

use crate::domain::errors::TransportError;
use crate::domain::guardian_set::GuardianSet;
use async_trait::async_trait;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;

/// Inbound payloads on one topic.
///
/// Lazy and unbounded while the transport lives; once it ends it cannot be
/// restarted, subscribe again instead.
pub type MessageStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Gossip transport carrying request and response envelopes.
///
/// Peer discovery and topic naming belong to the implementation.
#[async_trait]
pub trait QueryTransport: Send + Sync {
    /// Broadcast an opaque payload on `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Receive payloads published on `topic` from now on.
    async fn subscribe(&self, topic: &str) -> Result<MessageStream, TransportError>;
}

/// Source of the active guardian set.
///
/// Callers snapshot the returned set; later rotations never affect a query
/// that is already outstanding.
pub trait GuardianSetProvider: Send + Sync {
    fn current(&self) -> Arc<GuardianSet>;
}
