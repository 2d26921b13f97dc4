//! Per-user writer serialization.
//!
//! Each user key maps to an async mutex held across load, append and persist.
//! Entries are removed once the last writer releases them, so the table only
//! holds users with a write in flight. A waiter abandoned while queued cannot
//! release its own entry; such stale entries are swept on the next `acquire`.
//!
//! Guards own a handle to the table, so one can be moved into a blocking task
//! and keep the user locked until that task finishes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

type Slot = Arc<tokio::sync::Mutex<()>>;

#[derive(Default)]
pub struct UserLocks {
    table: Mutex<HashMap<String, Slot>>,
}

/// Held for the duration of one read-modify-write on a user's document.
pub struct UserWriteGuard {
    locks: Arc<UserLocks>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to `key`.
    pub async fn acquire(self: &Arc<Self>, key: &str) -> UserWriteGuard {
        let slot = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            // Clones are only taken under the table lock, so a count of one
            // means nobody holds or is queued on that slot.
            table.retain(|_, slot| Arc::strong_count(slot) > 1);
            table.entry(key.to_string()).or_default().clone()
        };
        let guard = slot.lock_owned().await;
        UserWriteGuard { locks: Arc::clone(self), key: key.to_string(), guard: Some(guard) }
    }

    /// Number of keys in the table. Counts users with a writer holding or
    /// waiting on them, plus stale entries not yet swept.
    pub fn active(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn release(&self, key: &str) {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if table.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            table.remove(key);
        }
    }
}

impl Drop for UserWriteGuard {
    fn drop(&mut self) {
        // The owned guard keeps its Arc alive; drop it before counting.
        self.guard.take();
        self.locks.release(&self.key);
    }
}
