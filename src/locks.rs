//! Per-appointment mutual exclusion.
//!
//! Transitions on the same appointment id run one at a time; different ids
//! never contend. Slots nobody holds or waits on are pruned as the table
//! grows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

const PRUNE_THRESHOLD: usize = 1024;

#[derive(Default)]
pub struct AppointmentLocks {
    slots: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl AppointmentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `id`. The guard releases it on drop.
    pub async fn acquire(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().expect("appointment lock table poisoned");
            if slots.len() >= PRUNE_THRESHOLD {
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            Arc::clone(slots.entry(id).or_default())
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots.lock().expect("appointment lock table poisoned").len()
    }
}
