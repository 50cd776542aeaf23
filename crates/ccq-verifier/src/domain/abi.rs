//! # ABI Call Codec
//!
//! Enough of the Solidity ABI to build view-function calls with static
//! arguments and to decode a single return value, e.g. `name()` or
//! `totalSupply()` on a token contract.

use super::ecdsa::keccak256;
use super::errors::{AbiError, CodecError};
use super::request::EthCallData;
use super::validator::CallResultDecoder;
use primitive_types::U256;
use shared_types::Address;
use std::collections::HashMap;

/// ABI word size.
const WORD: usize = 32;

/// First four bytes of `keccak256(signature)`, e.g. `"totalSupply()"`.
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Return types understood by [`decode_output`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbiType {
    Uint256,
    Address,
    Bool,
    Bytes32,
    String,
    Bytes,
}

impl AbiType {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Uint256 => "uint256",
            Self::Address => "address",
            Self::Bool => "bool",
            Self::Bytes32 => "bytes32",
            Self::String => "string",
            Self::Bytes => "bytes",
        }
    }

    pub const fn is_dynamic(&self) -> bool {
        matches!(self, Self::String | Self::Bytes)
    }
}

/// A decoded ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Uint(U256),
    Address(Address),
    Bool(bool),
    FixedBytes([u8; 32]),
    String(String),
    Bytes(Vec<u8>),
}

impl AbiValue {
    pub fn abi_type(&self) -> AbiType {
        match self {
            Self::Uint(_) => AbiType::Uint256,
            Self::Address(_) => AbiType::Address,
            Self::Bool(_) => AbiType::Bool,
            Self::FixedBytes(_) => AbiType::Bytes32,
            Self::String(_) => AbiType::String,
            Self::Bytes(_) => AbiType::Bytes,
        }
    }

    pub fn as_uint(&self) -> Option<U256> {
        match self {
            Self::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    fn encode_word(&self) -> Option<[u8; WORD]> {
        let mut word = [0u8; WORD];
        match self {
            Self::Uint(v) => v.to_big_endian(&mut word),
            Self::Address(a) => word[12..].copy_from_slice(a),
            Self::Bool(b) => word[31] = u8::from(*b),
            Self::FixedBytes(b) => word.copy_from_slice(b),
            Self::String(_) | Self::Bytes(_) => return None,
        }
        Some(word)
    }
}

/// Selector followed by one word per argument. Only static types are allowed.
pub fn encode_call(signature: &str, args: &[AbiValue]) -> Result<Vec<u8>, AbiError> {
    let mut data = Vec::with_capacity(4 + WORD * args.len());
    data.extend_from_slice(&function_selector(signature));
    for (i, arg) in args.iter().enumerate() {
        let word = arg.encode_word().ok_or(AbiError::DynamicArgument(i))?;
        data.extend_from_slice(&word);
    }
    Ok(data)
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8], AbiError> {
    let end = offset.checked_add(WORD).ok_or(AbiError::TooShort {
        needed: usize::MAX,
        actual: data.len(),
    })?;
    data.get(offset..end).ok_or(AbiError::TooShort {
        needed: end,
        actual: data.len(),
    })
}

/// Read a word as a `usize`, rejecting values that do not fit.
fn word_as_usize(word: &[u8], ty: &'static str) -> Result<usize, AbiError> {
    let value = U256::from_big_endian(word);
    if value > U256::from(u32::MAX) {
        return Err(AbiError::InvalidValue {
            ty,
            reason: format!("offset or length {value} out of range"),
        });
    }
    Ok(value.as_usize())
}

/// Decode a single return value of type `ty`.
pub fn decode_output(ty: AbiType, data: &[u8]) -> Result<AbiValue, AbiError> {
    let head = word_at(data, 0)?;
    match ty {
        AbiType::Uint256 => Ok(AbiValue::Uint(U256::from_big_endian(head))),
        AbiType::Address => {
            if head[..12].iter().any(|b| *b != 0) {
                return Err(AbiError::InvalidValue {
                    ty: ty.name(),
                    reason: "upper 12 bytes are not zero".to_string(),
                });
            }
            let mut address = [0u8; 20];
            address.copy_from_slice(&head[12..]);
            Ok(AbiValue::Address(address))
        }
        AbiType::Bool => match (head[..31].iter().all(|b| *b == 0), head[31]) {
            (true, 0) => Ok(AbiValue::Bool(false)),
            (true, 1) => Ok(AbiValue::Bool(true)),
            _ => Err(AbiError::InvalidValue {
                ty: ty.name(),
                reason: "word is not 0 or 1".to_string(),
            }),
        },
        AbiType::Bytes32 => {
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(head);
            Ok(AbiValue::FixedBytes(bytes))
        }
        AbiType::String | AbiType::Bytes => {
            let offset = word_as_usize(head, ty.name())?;
            let len = word_as_usize(word_at(data, offset)?, ty.name())?;
            let start = offset + WORD;
            let bytes = data.get(start..start + len).ok_or(AbiError::TooShort {
                needed: start + len,
                actual: data.len(),
            })?;

            if ty == AbiType::Bytes {
                return Ok(AbiValue::Bytes(bytes.to_vec()));
            }
            String::from_utf8(bytes.to_vec())
                .map(AbiValue::String)
                .map_err(|e| AbiError::InvalidValue {
                    ty: ty.name(),
                    reason: e.to_string(),
                })
        }
    }
}

/// Decodes call results by looking up the return type of each call's selector.
#[derive(Debug, Clone, Default)]
pub struct AbiResultDecoder {
    outputs: HashMap<[u8; 4], AbiType>,
}

impl AbiResultDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the return type of `signature`.
    pub fn with_output(mut self, signature: &str, ty: AbiType) -> Self {
        self.outputs.insert(function_selector(signature), ty);
        self
    }
}

impl CallResultDecoder for AbiResultDecoder {
    type Output = AbiValue;

    fn decode(&self, call: &EthCallData, result: &[u8]) -> Result<Self::Output, CodecError> {
        let selector = call.selector().ok_or(AbiError::MissingSelector)?;
        let ty = self
            .outputs
            .get(&selector)
            .ok_or(AbiError::UnknownSelector(selector))?;
        Ok(decode_output(*ty, result)?)
    }
}
