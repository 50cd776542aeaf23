//! # Guardian Sets and Quorum
//!
//! A guardian set is an immutable, indexed list of signer addresses. The
//! registry wraps one snapshot and answers "which guardian signed this?".

use super::errors::GuardianSetError;
use shared_types::Address;
use std::collections::HashMap;
use std::sync::Arc;

/// Signatures needed from `n` guardians: `n - floor((n - 1) / 3)`.
///
/// Tolerates up to a third of the set being faulty. `n = 0` yields 0.
pub const fn calculate_quorum(n: usize) -> usize {
    n.saturating_sub(n.saturating_sub(1) / 3)
}

/// Immutable snapshot of the active guardians.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardianSet {
    index: u32,
    keys: Vec<Address>,
}

impl GuardianSet {
    /// Build a set, rejecting empty sets and duplicate keys.
    pub fn new(index: u32, keys: Vec<Address>) -> Result<Self, GuardianSetError> {
        if keys.is_empty() {
            return Err(GuardianSetError::Empty);
        }

        let mut seen = HashMap::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            if seen.insert(*key, i).is_some() {
                return Err(GuardianSetError::DuplicateKey { key: *key, index: i });
            }
        }

        Ok(Self { index, keys })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn keys(&self) -> &[Address] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false for a constructed set.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key(&self, guardian_index: u32) -> Option<&Address> {
        self.keys.get(guardian_index as usize)
    }

    pub fn quorum(&self) -> usize {
        calculate_quorum(self.keys.len())
    }
}

/// Address-to-index lookup over one guardian set snapshot.
#[derive(Debug, Clone)]
pub struct GuardianRegistry {
    set: Arc<GuardianSet>,
    by_address: HashMap<Address, u32>,
}

impl GuardianRegistry {
    pub fn new(set: Arc<GuardianSet>) -> Self {
        let by_address = set
            .keys()
            .iter()
            .enumerate()
            .map(|(i, key)| (*key, i as u32))
            .collect();
        Self { set, by_address }
    }

    /// Position of `address` in the set, if it is a guardian.
    pub fn index_of(&self, address: &Address) -> Option<u32> {
        self.by_address.get(address).copied()
    }

    pub fn quorum_threshold(&self) -> usize {
        self.set.quorum()
    }

    pub fn guardian_set(&self) -> &Arc<GuardianSet> {
        &self.set
    }

    pub fn guardian_set_index(&self) -> u32 {
        self.set.index()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}
