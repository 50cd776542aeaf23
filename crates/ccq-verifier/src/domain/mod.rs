//! # Domain Layer
//!
//! Pure query verification logic with no I/O dependencies.
//! This is the inner layer of the hexagonal architecture.

pub mod abi;
pub mod aggregator;
pub mod digest;
pub mod ecdsa;
pub mod errors;
pub mod guardian_set;
pub mod request;
pub mod response;
pub mod validator;
pub mod wire;
