//! # Shared Types Crate
//!
//! Primitive identity and network types shared by the query verifier, the
//! gossip bus and the test suite.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: `Hash`, `Address` and `Environment` are
//!   defined once here.
//! - **Fixed widths**: Addresses and hashes are plain byte arrays so they can
//!   be compared, hashed and copied without allocation.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
