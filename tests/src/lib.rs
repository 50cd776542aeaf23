//! # Cross-Chain Query Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── guardian.rs       # Simulated guardian nodes on the in-memory bus
//! └── integration/      # Requester ↔ guardian flows
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p ccq-tests
//! cargo test -p ccq-tests integration::
//! ```

pub mod guardian;
pub mod integration;
