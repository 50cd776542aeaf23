//! # Adapters Module
//!
//! Infrastructure adapters implementing the ports.

pub mod envelope;
pub mod guardian_registry;
pub mod transport;

pub use envelope::GossipMessage;
pub use guardian_registry::StaticGuardianSetProvider;
pub use transport::InMemoryTransport;
