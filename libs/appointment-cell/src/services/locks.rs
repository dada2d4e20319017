use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

/// In-process mutual exclusion per (doctor, instant).
///
/// Booking and status transitions for the same instant run one at a time
/// under this lock. The store's unique index still backs it up for writers
/// in other processes.
#[derive(Default)]
pub struct SchedulingLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SchedulingLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_key(doctor_id: Uuid, at: DateTime<Utc>) -> String {
        format!("{}:{}", doctor_id, at.timestamp())
    }

    pub async fn acquire(&self, doctor_id: Uuid, at: DateTime<Utc>) -> OwnedMutexGuard<()> {
        let key = Self::lock_key(doctor_id, at);

        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // Entries nobody holds or waits on are dropped here.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key.clone()).or_default().clone()
        };

        let guard = lock.lock_owned().await;
        debug!("Scheduling lock acquired: {}", key);
        guard
    }

    pub fn held_count(&self) -> usize {
        self.locks
            .lock()
            .map(|locks| locks.len())
            .unwrap_or_default()
    }
}
