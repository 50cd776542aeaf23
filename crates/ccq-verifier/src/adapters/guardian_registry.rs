//! # Guardian Set Provider
//!
//! Holds the active guardian set and swaps it wholesale on rotation.

use crate::domain::errors::GuardianSetError;
use crate::domain::guardian_set::GuardianSet;
use crate::ports::outbound::GuardianSetProvider;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

/// In-process guardian set source.
#[derive(Debug)]
pub struct StaticGuardianSetProvider {
    current: RwLock<Arc<GuardianSet>>,
}

impl StaticGuardianSetProvider {
    pub fn new(set: GuardianSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(set)),
        }
    }

    /// Replace the active set. The new index must be strictly greater.
    ///
    /// Snapshots already handed out keep the old set.
    pub fn rotate(&self, set: GuardianSet) -> Result<(), GuardianSetError> {
        let mut current = self.current.write();
        if set.index() <= current.index() {
            return Err(GuardianSetError::StaleIndex {
                current: current.index(),
                proposed: set.index(),
            });
        }
        info!(
            from = current.index(),
            to = set.index(),
            guardians = set.len(),
            "Guardian set rotated"
        );
        *current = Arc::new(set);
        Ok(())
    }
}

impl GuardianSetProvider for StaticGuardianSetProvider {
    fn current(&self) -> Arc<GuardianSet> {
        Arc::clone(&self.current.read())
    }
}
