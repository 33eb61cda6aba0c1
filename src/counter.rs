//! Persisted counter store.
//!
//! DESIGN
//! ======
//! The count lives in a `watch` channel so readers can subscribe. Every
//! mutation writes the whole record back to storage before returning;
//! a failed write is logged and the in-memory count stays authoritative.
//!
//! The record layout matches what browser clients persist under the same
//! key, so a shared storage directory round-trips between them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::ErrorCode;
use crate::storage::{Storage, load_json, save_json};

pub const COUNTER_KEY: &str = "counter-storage";
const RECORD_VERSION: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct CounterState {
    count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct CounterRecord {
    state: CounterState,
    version: u32,
}

pub struct CounterStore {
    count: watch::Sender<i64>,
    storage: Arc<dyn Storage>,
}

impl CounterStore {
    /// Fresh store at zero. Nothing is read from storage.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let (count, _) = watch::channel(0);
        Self { count, storage }
    }

    /// Store hydrated from whatever record `storage` holds.
    #[must_use]
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let store = Self::new(storage);
        let stored = store.read_record();
        store.hydrate(stored);
        store
    }

    fn read_record(&self) -> Option<i64> {
        match load_json::<CounterRecord>(self.storage.as_ref(), COUNTER_KEY) {
            Ok(Some(record)) if record.version == RECORD_VERSION => Some(record.state.count),
            Ok(Some(record)) => {
                warn!(version = record.version, "ignoring counter record with unknown version");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "counter record unreadable");
                None
            }
        }
    }

    /// Apply a persisted count. `None` leaves the current count alone.
    /// Does not write back.
    pub fn hydrate(&self, stored: Option<i64>) {
        if let Some(count) = stored {
            debug!(count, "counter hydrated");
            self.count.send_replace(count);
        }
    }

    #[must_use]
    pub fn count(&self) -> i64 {
        *self.count.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<i64> {
        self.count.subscribe()
    }

    pub fn increment(&self) -> i64 {
        self.update(|n| n.saturating_add(1))
    }

    pub fn decrement(&self) -> i64 {
        self.update(|n| n.saturating_sub(1))
    }

    pub fn reset(&self) -> i64 {
        self.update(|_| 0)
    }

    pub fn set_count(&self, count: i64) -> i64 {
        self.update(|_| count)
    }

    fn update(&self, f: impl FnOnce(i64) -> i64) -> i64 {
        let mut next = 0;
        self.count.send_modify(|n| {
            *n = f(*n);
            next = *n;
        });
        self.persist(next);
        next
    }

    fn persist(&self, count: i64) {
        let record = CounterRecord { state: CounterState { count }, version: RECORD_VERSION };
        if let Err(e) = save_json(self.storage.as_ref(), COUNTER_KEY, &record) {
            warn!(error = %e, code = e.error_code(), count, "counter persist failed");
        }
    }
}

#[cfg(test)]
#[path = "counter_test.rs"]
mod tests;
