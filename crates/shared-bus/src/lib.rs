//! # Shared Bus - In-Memory Gossip Transport
//!
//! Topic-based publish/subscribe of opaque byte payloads. Stands in for the
//! peer-to-peer gossip layer in tests and single-process deployments.
//!
//! ## Model
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │  Requester   │  publish(req)      │   Guardian   │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!        ↑               ▼                    │
//!        │         ┌──────────────┐           │ publish(resp)
//!        └──────── │  Gossip Bus  │ ←─────────┘
//!   subscribe()    └──────────────┘
//! ```
//!
//! ## Semantics
//!
//! - Payloads are opaque; envelope framing belongs to the caller.
//! - A subscription only sees messages published after it was created.
//! - A subscription stream is infinite while the bus lives and cannot be
//!   restarted once it ends.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::TopicMessage;
pub use publisher::{GossipPublisher, InMemoryGossipBus};
pub use subscriber::{Subscription, SubscriptionError, TopicStream};

/// Maximum messages to buffer per subscriber before the oldest are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
