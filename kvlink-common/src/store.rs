//! # Store Interface
//!
//! Purpose: Keep callers independent of the backend that actually holds the
//! data. The remote pooled client and the in-memory store both implement
//! `KeyValueStore`, so either can be handed to code written against it.
//!
//! ## Design Principles
//! 1. **Strategy Pattern**: Backends are swapped behind one trait object.
//! 2. **Absence Is Normal**: Only `get` reports a miss as an error; `delete`
//!    and `expire` answer with a boolean instead.
//! 3. **No Hidden Retries**: Every failure propagates to the caller as-is.

use std::collections::HashSet;

use crate::error::StoreResult;
use crate::types::{ScanPage, TtlStatus};

/// Narrow key/value operation set shared by every backend.
///
/// Implementations must be safe to share across threads without external
/// locking. Once `close` has succeeded, every call (including a second
/// `close`) fails with `FailureCause::Closed`.
pub trait KeyValueStore: Send + Sync {
    /// Round-trips a no-op and returns the store's liveness reply (`PONG`).
    fn ping(&self) -> StoreResult<String>;

    /// Stores `value` under `key` with no expiration.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Stores `value` under `key`, expiring after `seconds`.
    fn set_with_ttl(&self, key: &str, value: &str, seconds: u64) -> StoreResult<()>;

    /// Fetches the value for `key`.
    ///
    /// Returns `StoreError::NotFound` when the key is absent.
    fn get(&self, key: &str) -> StoreResult<String>;

    /// Removes `key`. Returns true when a key was actually removed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Returns true iff the store currently holds `key`.
    fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Returns the TTL state of `key`.
    fn ttl(&self, key: &str) -> StoreResult<TtlStatus>;

    /// Sets or replaces the TTL of `key`. Returns false when the key is absent.
    fn expire(&self, key: &str, seconds: u64) -> StoreResult<bool>;

    /// Lists every key matching the glob `pattern`.
    ///
    /// This walks the whole keyspace in one call and blocks the store while
    /// it does; use `scan` for production-sized keyspaces.
    fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Returns one page of a cursor-based scan.
    ///
    /// Start with cursor 0 and keep passing the returned cursor until it is
    /// 0 again. Keys mutated during the pass may be returned twice or missed.
    /// An empty `pattern` matches every key and a `count` of 0 uses the
    /// backend's default batch size.
    fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage>;

    /// Releases the backend. Terminal.
    fn close(&self) -> StoreResult<()>;

    /// Counts keys matching `pattern`. Same cost as `keys`.
    fn count_matching(&self, pattern: &str) -> StoreResult<u64> {
        Ok(self.keys(pattern)?.len() as u64)
    }

    /// Runs a full scan pass and returns each matching key once, in the
    /// order first seen.
    fn scan_all(&self, pattern: &str, count: usize) -> StoreResult<Vec<String>> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        let mut cursor = 0;
        loop {
            let page = self.scan(cursor, pattern, count)?;
            for key in page.keys {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
            cursor = page.cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }
}
