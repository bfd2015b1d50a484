//! # Store Client
//!
//! Purpose: Expose a compact, blocking API for issuing Redis-compatible
//! commands over a pooled set of RESP2 connections.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `StoreClient` hides pooling and framing details.
//! 2. **Strategy Pattern**: Operations are reached through `KeyValueStore`, so
//!    callers can substitute another backend.
//! 3. **Fail Fast**: Protocol violations surface immediately as errors; no
//!    operation retries.

use tracing::debug;

use kvlink_common::{
    FailureCause, KeyValueStore, ScanPage, StoreError, StoreResult, TtlStatus,
};

use crate::config::{default_config, StoreConfig};
use crate::pool::{ConnectionPool, PoolStats};
use crate::resp::RespValue;

/// Pooled client for a remote Redis-compatible store.
///
/// Each call acquires a connection, executes one command, and returns the
/// connection to the pool. Clones share the pool; closing any clone closes
/// all of them.
#[derive(Clone)]
pub struct StoreClient {
    pool: ConnectionPool,
}

impl StoreClient {
    /// Creates a client from `config`.
    ///
    /// Validates the configuration and builds the pool; connections are
    /// dialed lazily or by the background warm-up, never on this thread.
    pub fn connect(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let pool = ConnectionPool::new(config)?;
        Ok(StoreClient { pool })
    }

    /// Creates a client from `default_config()`.
    pub fn connect_default() -> StoreResult<Self> {
        Self::connect(default_config())
    }

    /// Returns current pool counters.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Returns true once the client has been closed.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    fn exec(&self, args: &[&[u8]]) -> StoreResult<RespValue> {
        let mut conn = self.pool.acquire()?;
        match conn.exec(args)? {
            RespValue::Error(message) => {
                let message = String::from_utf8_lossy(&message).into_owned();
                debug!(command = %String::from_utf8_lossy(args[0]), %message, "server error reply");
                Err(FailureCause::Server(message).into())
            }
            reply => Ok(reply),
        }
    }

    fn exec_ok(&self, command: &'static str, args: &[&[u8]]) -> StoreResult<()> {
        match self.exec(args)? {
            RespValue::Simple(_) => Ok(()),
            _ => Err(unexpected(command)),
        }
    }

    fn exec_integer(&self, command: &'static str, args: &[&[u8]]) -> StoreResult<i64> {
        match self.exec(args)? {
            RespValue::Integer(value) => Ok(value),
            _ => Err(unexpected(command)),
        }
    }
}

impl KeyValueStore for StoreClient {
    fn ping(&self) -> StoreResult<String> {
        match self.exec(&[b"PING"])? {
            RespValue::Simple(text) => decode_text(text),
            RespValue::Bulk(Some(data)) => decode_text(data),
            _ => Err(unexpected("PING")),
        }
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.exec_ok("SET", &[b"SET", key.as_bytes(), value.as_bytes()])
    }

    fn set_with_ttl(&self, key: &str, value: &str, seconds: u64) -> StoreResult<()> {
        let seconds = seconds.to_string();
        self.exec_ok(
            "SET",
            &[b"SET", key.as_bytes(), value.as_bytes(), b"EX", seconds.as_bytes()],
        )
    }

    /// Returns `StoreError::NotFound` when the reply is a null bulk string.
    fn get(&self, key: &str) -> StoreResult<String> {
        match self.exec(&[b"GET", key.as_bytes()])? {
            RespValue::Bulk(Some(data)) => decode_text(data),
            RespValue::Bulk(None) => Err(StoreError::NotFound),
            _ => Err(unexpected("GET")),
        }
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.exec_integer("DEL", &[b"DEL", key.as_bytes()])? > 0)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.exec_integer("EXISTS", &[b"EXISTS", key.as_bytes()])? > 0)
    }

    fn ttl(&self, key: &str) -> StoreResult<TtlStatus> {
        let value = self.exec_integer("TTL", &[b"TTL", key.as_bytes()])?;
        TtlStatus::from_reply(value).ok_or_else(|| unexpected("TTL"))
    }

    fn expire(&self, key: &str, seconds: u64) -> StoreResult<bool> {
        let seconds = seconds.to_string();
        Ok(self.exec_integer("EXPIRE", &[b"EXPIRE", key.as_bytes(), seconds.as_bytes()])? == 1)
    }

    fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        match self.exec(&[b"KEYS", pattern.as_bytes()])? {
            RespValue::Array(items) => decode_key_list("KEYS", items),
            _ => Err(unexpected("KEYS")),
        }
    }

    /// Sends `SCAN cursor [MATCH pattern] [COUNT count]`; the reply is a
    /// two-element array of the next cursor and the page of keys.
    ///
    /// `MATCH` is left out for an empty pattern and `COUNT` for a zero
    /// count, so the server applies its defaults.
    fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        let cursor = cursor.to_string();
        let count_arg = count.to_string();
        let mut args: Vec<&[u8]> = vec![b"SCAN".as_slice(), cursor.as_bytes()];
        if !pattern.is_empty() {
            args.extend([b"MATCH".as_slice(), pattern.as_bytes()]);
        }
        if count > 0 {
            args.extend([b"COUNT".as_slice(), count_arg.as_bytes()]);
        }
        let reply = self.exec(&args)?;

        let RespValue::Array(mut parts) = reply else {
            return Err(unexpected("SCAN"));
        };
        if parts.len() != 2 {
            return Err(unexpected("SCAN"));
        }
        let keys = match parts.pop() {
            Some(RespValue::Array(items)) => decode_key_list("SCAN", items)?,
            _ => return Err(unexpected("SCAN")),
        };
        let cursor = match parts.pop() {
            Some(RespValue::Bulk(Some(raw))) => std::str::from_utf8(&raw)
                .ok()
                .and_then(|text| text.parse::<u64>().ok())
                .ok_or_else(|| unexpected("SCAN"))?,
            _ => return Err(unexpected("SCAN")),
        };
        Ok(ScanPage { keys, cursor })
    }

    /// Closes the pool. A second call fails with `FailureCause::Closed`.
    fn close(&self) -> StoreResult<()> {
        Ok(self.pool.close()?)
    }
}

fn decode_text(data: Vec<u8>) -> StoreResult<String> {
    String::from_utf8(data)
        .map_err(|_| FailureCause::Protocol("reply is not valid UTF-8".to_string()).into())
}

fn decode_key_list(command: &'static str, items: Vec<RespValue>) -> StoreResult<Vec<String>> {
    items
        .into_iter()
        .map(|item| match item {
            RespValue::Bulk(Some(data)) => decode_text(data),
            _ => Err(unexpected(command)),
        })
        .collect()
}

fn unexpected(command: &'static str) -> StoreError {
    StoreError::Failed(FailureCause::UnexpectedResponse { command })
}
