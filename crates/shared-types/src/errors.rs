//! # Error Types
//!
//! Parse errors for the shared primitives.

use thiserror::Error;

/// Unknown network environment name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown environment: {0} (expected mainnet, testnet or devnet)")]
pub struct ParseEnvironmentError(pub String);

/// Errors parsing a hex-encoded address.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseAddressError {
    /// Input is not valid hex.
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// Decoded input is not 20 bytes long.
    #[error("Invalid address length: {0} bytes, expected 20")]
    InvalidLength(usize),
}
