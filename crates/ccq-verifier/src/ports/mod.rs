//! # Ports Layer
//!
//! Trait definitions for the hexagonal architecture.

pub mod inbound;
pub mod outbound;
