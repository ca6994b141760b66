//! Parked connection cache for the reverse cascade.
//!
//! Connections waiting to be claimed are keyed by their serialized
//! target address and expire after a fixed deadline. Sweeping is
//! amortized onto the accept path and rate limited to one pass per
//! interval; expired connections are closed outside the lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use shade_core::defaults::CACHE_SWEEP_INTERVAL_SECS;
use tokio::time::Instant;
use tracing::debug;

struct ParkedEntry<S> {
    conn: S,
    deadline: Instant,
}

/// Cache of connections parked for a claimant.
pub(crate) struct ConnCache<S> {
    entries: Mutex<HashMap<String, ParkedEntry<S>>>,
    ttl: Duration,
    base: Instant,
    /// Milliseconds since `base` before the next sweep may run.
    next_sweep: AtomicU64,
}

impl<S> ConnCache<S> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            base: Instant::now(),
            next_sweep: AtomicU64::new(0),
        }
    }

    /// Park a connection under `key`. Returns any connection previously
    /// parked under the same key, which the caller should close.
    pub fn park(&self, key: String, conn: S) -> Option<S> {
        let entry = ParkedEntry {
            conn,
            deadline: Instant::now() + self.ttl,
        };
        self.entries.lock().insert(key, entry).map(|e| e.conn)
    }

    /// Remove and return the connection parked under `key`.
    pub fn claim(&self, key: &str) -> Option<S> {
        self.entries.lock().remove(key).map(|e| e.conn)
    }

    /// Evict expired entries, at most once per sweep interval. Evicted
    /// connections are dropped after the lock is released.
    pub fn maybe_sweep(&self) {
        let now_ms = self.base.elapsed().as_millis() as u64;
        let due = self.next_sweep.load(Ordering::Relaxed);
        if now_ms < due {
            return;
        }
        let next = now_ms + CACHE_SWEEP_INTERVAL_SECS * 1000;
        if self
            .next_sweep
            .compare_exchange(due, next, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let expired: Vec<ParkedEntry<S>> = {
            let mut entries = self.entries.lock();
            let now = Instant::now();
            let keys: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| entry.deadline <= now)
                .map(|(key, _)| key.clone())
                .collect();
            keys.iter().filter_map(|key| entries.remove(key)).collect()
        };
        if !expired.is_empty() {
            debug!(evicted = expired.len(), "swept expired parked connections");
        }
    }
}

#[cfg(test)]
impl<S> ConnCache<S> {
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
