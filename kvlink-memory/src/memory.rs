//! # In-Memory Store
//!
//! Provide an ordered, TTL-aware key/value map behind the `KeyValueStore`
//! trait.
//!
//! ## Usage
//!
//! - Use `MemoryStore::new()` for an empty store.
//! - Use `start_expirer` to enable active TTL cleanup in the background;
//!   without it, expired keys are dropped lazily when touched.
//!
//! ## Design Principles
//!
//! 1. **Ordered Keyspace**: A `BTreeMap` gives `SCAN` a stable walk order, so
//!    a cursor is simply the number of keys already examined.
//! 2. **TTL Fast Path**: Expiration is checked on access; no timer per key.
//! 3. **Strategy Pattern**: Implements `KeyValueStore` to keep callers
//!    decoupled from the backend.
//!
//! ## Structure Overview
//!
//! ```text
//! MemoryStore
//!   ├── entries: RwLock<BTreeMap<String, Entry>>
//!   │     └── Entry { value, expires_at }
//!   └── closed: AtomicBool
//! ```

use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

use kvlink_common::{
    glob_match, FailureCause, KeyValueStore, ScanPage, StoreError, StoreResult, TtlStatus,
};

/// `SCAN` batch size used when the caller passes 0, as Redis does.
pub const DEFAULT_SCAN_COUNT: usize = 10;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    // Absolute expiration timestamp.
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: String) -> Self {
        Entry {
            value,
            expires_at: None,
        }
    }

    /// Returns true when the entry has expired at `now`.
    fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

/// In-process implementation of `KeyValueStore`.
///
/// All operations take one lock on the keyspace; this favors simplicity over
/// multi-core throughput.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Entry>>,
    closed: AtomicBool,
}

/// Handle for the background expiration sweeper.
///
/// Call `stop` to signal shutdown and join the thread.
pub struct ExpirationHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ExpirationHandle {
    /// Stops the sweeper and waits for the thread to finish.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    /// Returns true when no live key is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes expired entries and returns how many were dropped.
    ///
    /// This is an O(n) walk and is intended for a periodic background sweep.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "purged expired keys");
        }
        removed
    }

    /// Starts a background thread that periodically removes expired entries.
    ///
    /// The returned handle must be stopped to avoid leaking the thread.
    pub fn start_expirer(self: &Arc<Self>, interval: Duration) -> ExpirationHandle {
        let interval = if interval.is_zero() {
            Duration::from_millis(1)
        } else {
            interval
        };

        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = Arc::clone(&stop);
        let store = Arc::clone(self);

        let join = std::thread::spawn(move || {
            while !stop_thread.load(Ordering::Acquire) {
                std::thread::sleep(interval);
                store.purge_expired(Instant::now());
            }
        });

        ExpirationHandle {
            stop,
            join: Some(join),
        }
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Failed(FailureCause::Closed));
        }
        Ok(())
    }

    /// Runs `f` on the live entry for `key`, dropping it first if expired.
    fn with_live_entry<T>(
        &self,
        key: &str,
        f: impl FnOnce(Option<&mut Entry>, Instant) -> T,
    ) -> T {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let expired = entries
            .get(key)
            .map(|entry| entry.is_expired(now))
            .unwrap_or(false);
        if expired {
            entries.remove(key);
        }
        f(entries.get_mut(key), now)
    }
}

impl KeyValueStore for MemoryStore {
    fn ping(&self) -> StoreResult<String> {
        self.ensure_open()?;
        Ok("PONG".to_string())
    }

    /// Inserts or replaces a value, clearing any previous TTL.
    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.ensure_open()?;
        self.entries
            .write()
            .insert(key.to_string(), Entry::new(value.to_string()));
        Ok(())
    }

    /// Rejects a zero or unrepresentable TTL the way Redis rejects `SET EX`.
    fn set_with_ttl(&self, key: &str, value: &str, seconds: u64) -> StoreResult<()> {
        self.ensure_open()?;
        if seconds == 0 {
            return Err(invalid_expire_time("set"));
        }
        let mut entry = Entry::new(value.to_string());
        entry.expires_at = Some(deadline_after(Instant::now(), seconds, "set")?);
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<String> {
        self.ensure_open()?;
        self.with_live_entry(key, |entry, _| match entry {
            Some(entry) => Ok(entry.value.clone()),
            None => Err(StoreError::NotFound),
        })
    }

    /// Expired entries are treated as missing to match Redis semantics.
    fn delete(&self, key: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        let now = Instant::now();
        let removed = self.entries.write().remove(key);
        Ok(removed.map(|entry| !entry.is_expired(now)).unwrap_or(false))
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        Ok(self.with_live_entry(key, |entry, _| entry.is_some()))
    }

    fn ttl(&self, key: &str) -> StoreResult<TtlStatus> {
        self.ensure_open()?;
        Ok(self.with_live_entry(key, |entry, now| match entry {
            None => TtlStatus::Missing,
            Some(entry) => match entry.expires_at {
                None => TtlStatus::NoExpiry,
                Some(deadline) => TtlStatus::ExpiresIn(deadline.saturating_duration_since(now)),
            },
        }))
    }

    /// An unrepresentable deadline fails and leaves the key untouched.
    fn expire(&self, key: &str, seconds: u64) -> StoreResult<bool> {
        self.ensure_open()?;
        let deadline = deadline_after(Instant::now(), seconds, "expire")?;
        Ok(self.with_live_entry(key, |entry, _| match entry {
            Some(entry) => {
                entry.expires_at = Some(deadline);
                true
            }
            None => false,
        }))
    }

    fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.ensure_open()?;
        let now = Instant::now();
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    /// Examines up to `count` keys in key order starting at position
    /// `cursor` and returns the live ones that match. An empty pattern
    /// matches everything.
    fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        self.ensure_open()?;
        let count = if count == 0 { DEFAULT_SCAN_COUNT } else { count };
        let start = usize::try_from(cursor).unwrap_or(usize::MAX);
        let now = Instant::now();
        let entries = self.entries.read();

        let keys = entries
            .iter()
            .skip(start)
            .take(count)
            .filter(|(key, entry)| {
                !entry.is_expired(now) && (pattern.is_empty() || glob_match(pattern, key))
            })
            .map(|(key, _)| key.clone())
            .collect();

        let next = start.saturating_add(count);
        let cursor = if next >= entries.len() { 0 } else { next as u64 };
        Ok(ScanPage { keys, cursor })
    }

    fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StoreError::Failed(FailureCause::Closed));
        }
        self.entries.write().clear();
        debug!("memory store closed");
        Ok(())
    }
}

/// Deadline `seconds` after `now`, or the error Redis gives for an
/// expire time it cannot represent.
fn deadline_after(now: Instant, seconds: u64, command: &str) -> StoreResult<Instant> {
    now.checked_add(Duration::from_secs(seconds))
        .ok_or_else(|| invalid_expire_time(command))
}

fn invalid_expire_time(command: &str) -> StoreError {
    StoreError::Failed(FailureCause::Server(format!(
        "ERR invalid expire time in '{command}' command"
    )))
}
