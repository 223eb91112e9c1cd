use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_models::SlotKey;

use crate::models::AppointmentError;

/// Mutual-exclusion scope of a mutation: one therapist at one date and time,
/// covering every modality offered there.
pub type LockKey = (Uuid, NaiveDate, NaiveTime);

pub fn lock_key(key: &SlotKey) -> LockKey {
    (key.therapist_id, key.date, key.time)
}

type LockTable = HashMap<LockKey, Arc<AsyncMutex<()>>>;

/// Per-key async locks with a bounded wait.
///
/// Entries are created on demand and dropped once no guard or waiter refers to
/// them, so the table only grows with the number of slots being mutated right now.
pub struct SlotLockManager {
    table: Arc<Mutex<LockTable>>,
    timeout: Duration,
}

impl SlotLockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    /// Locks every key, in sorted order, within a single deadline. Running out of
    /// time is a retryable conflict.
    pub async fn acquire(&self, keys: &[LockKey]) -> Result<SlotGuard, AppointmentError> {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();

        let deadline = Instant::now() + self.timeout;
        let mut guard = SlotGuard {
            table: self.table.clone(),
            keys: Vec::with_capacity(keys.len()),
            held: Vec::with_capacity(keys.len()),
        };

        for key in keys {
            let mutex = {
                let mut table = lock_table(&self.table);
                table.entry(key).or_default().clone()
            };
            guard.keys.push(key);

            match timeout_at(deadline, mutex.lock_owned()).await {
                Ok(held) => guard.held.push(held),
                Err(_) => {
                    warn!("Timed out after {:?} waiting for slot lock {:?}", self.timeout, key);
                    return Err(AppointmentError::Conflict(
                        "slot is busy, please retry with a fresh slot list".to_string(),
                    ));
                }
            }
        }

        debug!("Acquired {} slot lock(s)", guard.held.len());
        Ok(guard)
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        lock_table(&self.table).len()
    }
}

/// Holds slot locks until dropped.
#[derive(Debug)]
pub struct SlotGuard {
    table: Arc<Mutex<LockTable>>,
    keys: Vec<LockKey>,
    held: Vec<OwnedMutexGuard<()>>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.held.clear();

        let mut table = lock_table(&self.table);
        for key in &self.keys {
            if table.get(key).is_some_and(|mutex| Arc::strong_count(mutex) == 1) {
                table.remove(key);
            }
        }
    }
}

fn lock_table(table: &Mutex<LockTable>) -> MutexGuard<'_, LockTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}
