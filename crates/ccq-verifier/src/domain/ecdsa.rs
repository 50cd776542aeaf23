//! # Recoverable ECDSA (secp256k1)
//!
//! Signing and signer recovery over 32-byte digests.
//!
//! ## Security Notes
//!
//! - **Malleability Prevention (EIP-2)**: S must be STRICTLY LESS THAN SECP256K1_HALF_ORDER
//! - **Scalar Range Validation**: R and S must be in [1, n-1]
//! - **Constant-Time Operations**: Uses `subtle` for the range comparisons
//! - Signatures are produced low-S with `v ∈ {0, 1}`; recovery also accepts 27/28

use super::errors::SignatureError;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha3::{Digest, Keccak256};
use shared_types::{to_hex, Address, Hash};
use std::fmt;
use subtle::{Choice, ConstantTimeEq};
use zeroize::Zeroize;

/// Serialized signature length: `r (32) || s (32) || v (1)`.
pub const SIGNATURE_LENGTH: usize = 65;

/// secp256k1 curve order n
/// n = 0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141
const SECP256K1_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

/// Half of the secp256k1 curve order (for malleability check).
const SECP256K1_HALF_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
];

// =============================================================================
// SIGNATURE TYPE
// =============================================================================

/// A 65-byte recoverable signature `r || s || v`.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecoverableSignature(#[serde_as(as = "Bytes")] [u8; SIGNATURE_LENGTH]);

impl RecoverableSignature {
    /// Parse from a byte slice; only the length is checked here.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SignatureError> {
        let array: [u8; SIGNATURE_LENGTH] = bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidLength(bytes.len()))?;
        Ok(Self(array))
    }

    pub const fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    pub fn r(&self) -> [u8; 32] {
        let mut r = [0u8; 32];
        r.copy_from_slice(&self.0[..32]);
        r
    }

    pub fn s(&self) -> [u8; 32] {
        let mut s = [0u8; 32];
        s.copy_from_slice(&self.0[32..64]);
        s
    }

    pub fn v(&self) -> u8 {
        self.0[64]
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoverableSignature({})", to_hex(&self.0))
    }
}

impl AsRef<[u8]> for RecoverableSignature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// =============================================================================
// SIGNER
// =============================================================================

/// A secp256k1 private key used to sign query requests or responses.
///
/// How the key is stored is up to the caller; this type only accepts raw
/// 32-byte scalars or their hex encoding.
#[derive(Clone)]
pub struct QuerySigner {
    key: SigningKey,
    address: Address,
}

impl QuerySigner {
    pub fn from_signing_key(key: SigningKey) -> Self {
        let address = address_from_pubkey(key.verifying_key());
        Self { key, address }
    }

    /// Load from raw 32-byte private key material.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        let key = SigningKey::from_slice(bytes).map_err(|_| SignatureError::InvalidPrivateKey)?;
        Ok(Self::from_signing_key(key))
    }

    /// Load from a hex string, with or without `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let trimmed = s.trim();
        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let mut bytes = hex::decode(stripped).map_err(|_| SignatureError::InvalidPrivateKey)?;
        let signer = Self::from_bytes(&bytes);
        bytes.zeroize();
        signer
    }

    /// Address derived from the public key.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        self.key.verifying_key()
    }

    /// Sign a 32-byte digest, producing a low-S signature with `v ∈ {0, 1}`.
    pub fn sign(&self, digest: &Hash) -> Result<RecoverableSignature, SignatureError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|_| SignatureError::SigningFailed)?;

        // Negating S mirrors R's y-coordinate, so the parity bit flips too.
        let (signature, recovery_id) = match signature.normalize_s() {
            Some(normalized) => (
                normalized,
                RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced()),
            ),
            None => (signature, recovery_id),
        };

        let mut bytes = [0u8; SIGNATURE_LENGTH];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = recovery_id.to_byte();
        Ok(RecoverableSignature(bytes))
    }
}

impl fmt::Debug for QuerySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySigner")
            .field("address", &to_hex(&self.address))
            .finish_non_exhaustive()
    }
}

// =============================================================================
// RECOVERY
// =============================================================================

/// Recover the signer's address from a digest and signature.
///
/// Rejects out-of-range R or S, high S, and recovery ids other than
/// 0, 1, 27 and 28.
pub fn recover_address(
    digest: &Hash,
    signature: &RecoverableSignature,
) -> Result<Address, SignatureError> {
    let r = signature.r();
    let s = signature.s();

    if !is_valid_scalar(&r) || !is_valid_scalar(&s) {
        return Err(SignatureError::InvalidFormat);
    }

    if !is_low_s(&s) {
        return Err(SignatureError::MalleableSignature);
    }

    let recovery_id = parse_recovery_id(signature.v())?;

    let sig = Signature::from_slice(&signature.as_bytes()[..64])
        .map_err(|_| SignatureError::InvalidFormat)?;

    let recovered_key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;

    Ok(address_from_pubkey(&recovered_key))
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Keccak256 hash function.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Derive the 20-byte address from a public key.
///
/// keccak256 of the uncompressed point without its `0x04` tag, last 20 bytes.
pub fn address_from_pubkey(public_key: &VerifyingKey) -> Address {
    let pubkey_bytes = public_key.to_encoded_point(false);
    let hash = keccak256(&pubkey_bytes.as_bytes()[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Constant-time `a < b` over big-endian 32-byte integers.
fn ct_less_than(a: &[u8; 32], b: &[u8; 32]) -> Choice {
    let mut less = Choice::from(0u8);
    let mut greater = Choice::from(0u8);

    for i in 0..32 {
        let not_decided = !(less | greater);
        less |= not_decided & Choice::from((a[i] < b[i]) as u8);
        greater |= not_decided & Choice::from((a[i] > b[i]) as u8);
    }

    less
}

/// S strictly below half the curve order (EIP-2).
fn is_low_s(s: &[u8; 32]) -> bool {
    ct_less_than(s, &SECP256K1_HALF_ORDER).into()
}

/// Scalar in [1, n-1].
fn is_valid_scalar(scalar: &[u8; 32]) -> bool {
    let mut is_zero = Choice::from(1u8);
    for &byte in scalar {
        is_zero &= byte.ct_eq(&0u8);
    }

    (!is_zero & ct_less_than(scalar, &SECP256K1_ORDER)).into()
}

/// Valid v values: 0, 1, 27, 28
fn parse_recovery_id(v: u8) -> Result<RecoveryId, SignatureError> {
    let id = match v {
        0 | 27 => 0,
        1 | 28 => 1,
        _ => return Err(SignatureError::InvalidRecoveryId(v)),
    };

    RecoveryId::try_from(id).map_err(|_| SignatureError::InvalidRecoveryId(v))
}

/// s' = n - s
#[cfg(test)]
pub(crate) fn invert_s(s: &[u8; 32]) -> [u8; 32] {
    let mut result = [0u8; 32];
    let mut borrow: i32 = 0;

    for i in (0..32).rev() {
        let diff = (SECP256K1_ORDER[i] as i32) - (s[i] as i32) - borrow;
        if diff < 0 {
            result[i] = (diff + 256) as u8;
            borrow = 1;
        } else {
            result[i] = diff as u8;
            borrow = 0;
        }
    }

    result
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;

    /// Signer over a fresh random key.
    pub fn random_signer() -> QuerySigner {
        QuerySigner::from_signing_key(SigningKey::random(&mut rand::thread_rng()))
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers::*;
    use super::*;

    #[test]
    fn test_sign_recover_round_trip() {
        let signer = random_signer();
        let digest = keccak256(b"query digest");
        let signature = signer.sign(&digest).unwrap();

        assert!(signature.v() <= 1);
        assert_eq!(recover_address(&digest, &signature).unwrap(), signer.address());
    }

    #[test]
    fn test_signatures_are_low_s() {
        let signer = random_signer();
        for i in 0..32u8 {
            let digest = keccak256(&[i]);
            let signature = signer.sign(&digest).unwrap();
            assert!(is_low_s(&signature.s()));
        }
    }

    #[test]
    fn test_legacy_v_accepted() {
        let signer = random_signer();
        let digest = keccak256(b"legacy");
        let mut bytes = *signer.sign(&digest).unwrap().as_bytes();
        bytes[64] += 27;

        let legacy = RecoverableSignature::from_bytes(bytes);
        assert_eq!(recover_address(&digest, &legacy).unwrap(), signer.address());
    }

    #[test]
    fn test_wrong_digest_recovers_other_address() {
        let signer = random_signer();
        let signature = signer.sign(&keccak256(b"a")).unwrap();
        let recovered = recover_address(&keccak256(b"b"), &signature);
        assert_ne!(recovered.ok(), Some(signer.address()));
    }

    #[test]
    fn test_high_s_rejected() {
        let signer = random_signer();
        let digest = keccak256(b"malleable");
        let signature = signer.sign(&digest).unwrap();

        let mut bytes = *signature.as_bytes();
        bytes[32..64].copy_from_slice(&invert_s(&signature.s()));
        bytes[64] ^= 1;

        assert_eq!(
            recover_address(&digest, &RecoverableSignature::from_bytes(bytes)),
            Err(SignatureError::MalleableSignature)
        );
    }

    #[test]
    fn test_zero_r_rejected() {
        let signer = random_signer();
        let digest = keccak256(b"zero r");
        let mut bytes = *signer.sign(&digest).unwrap().as_bytes();
        bytes[..32].fill(0);

        assert_eq!(
            recover_address(&digest, &RecoverableSignature::from_bytes(bytes)),
            Err(SignatureError::InvalidFormat)
        );
    }

    #[test]
    fn test_invalid_recovery_id() {
        let signer = random_signer();
        let digest = keccak256(b"bad v");
        let mut bytes = *signer.sign(&digest).unwrap().as_bytes();
        bytes[64] = 2;

        assert_eq!(
            recover_address(&digest, &RecoverableSignature::from_bytes(bytes)),
            Err(SignatureError::InvalidRecoveryId(2))
        );
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert_eq!(
            RecoverableSignature::from_slice(&[0u8; 64]),
            Err(SignatureError::InvalidLength(64))
        );
    }

    #[test]
    fn test_signer_from_hex() {
        // Well-known test key: address 0x7e5f4552091a69125d5dfcb7b8c2659029395bdf
        let signer = QuerySigner::from_hex(
            "0x0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        assert_eq!(
            to_hex(&signer.address()),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_invalid_private_key() {
        assert_eq!(
            QuerySigner::from_bytes(&[0u8; 32]).unwrap_err(),
            SignatureError::InvalidPrivateKey
        );
        assert_eq!(
            QuerySigner::from_hex("not hex").unwrap_err(),
            SignatureError::InvalidPrivateKey
        );
    }

    #[test]
    fn test_half_order_is_not_low() {
        assert!(!is_low_s(&SECP256K1_HALF_ORDER));
        assert!(!is_valid_scalar(&SECP256K1_ORDER));
    }
}
