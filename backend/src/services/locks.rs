//! Per-family serialization of state-changing operations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::types::FamilyId;

/// One async lock per family, created on demand. Different families never
/// contend with each other.
#[derive(Default)]
pub struct FamilyLocks {
    slots: Mutex<HashMap<FamilyId, Arc<AsyncMutex<()>>>>,
}

impl FamilyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, family_id: FamilyId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            // Entries only referenced by the map are idle.
            slots.retain(|_, lock| Arc::strong_count(lock) > 1);
            slots.entry(family_id).or_default().clone()
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
