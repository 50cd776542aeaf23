//! # Core Domain Entities
//!
//! Primitive types shared by every crate in the workspace.
//!
//! ## Clusters
//!
//! - **Identity**: `Address`, `Hash`
//! - **Chains**: `ChainId`
//! - **Networks**: `Environment`

use crate::errors::{ParseAddressError, ParseEnvironmentError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 32-byte Keccak-256 hash.
pub type Hash = [u8; 32];

/// A 20-byte Ethereum-style address.
///
/// Guardian keys and EVM call targets both use this width.
pub type Address = [u8; 20];

/// Numeric chain identifier used by per-chain queries.
pub type ChainId = u16;

/// Network environment a query is bound to.
///
/// The environment is mixed into every signed digest, so a signature made for
/// one network never verifies on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Production network.
    MainNet,
    /// Public test network.
    TestNet,
    /// Local development network.
    #[default]
    DevNet,
}

impl Environment {
    /// Lowercase network name used in digest prefixes and configuration.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MainNet => "mainnet",
            Self::TestNet => "testnet",
            Self::DevNet => "devnet",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ParseEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "prod" => Ok(Self::MainNet),
            "testnet" | "test" => Ok(Self::TestNet),
            "devnet" | "dev" | "unsafedevnet" => Ok(Self::DevNet),
            other => Err(ParseEnvironmentError(other.to_string())),
        }
    }
}

/// Format bytes as a `0x`-prefixed lowercase hex string.
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Parse a 20-byte address from hex, with or without the `0x` prefix.
pub fn parse_address(s: &str) -> Result<Address, ParseAddressError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped).map_err(|e| ParseAddressError::InvalidHex(e.to_string()))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| ParseAddressError::InvalidLength(len))
}
