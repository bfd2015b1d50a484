//! # Error Types
//!
//! Two outcomes are distinguished for callers: a semantic miss (`get` on an
//! absent key) and a failed store operation. The failure carries its cause
//! for diagnostics; callers that only care about "did it work" match on
//! `StoreError` and ignore the cause.

use std::time::Duration;

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by every `KeyValueStore` implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key does not exist. Only `get` reports this.
    #[error("key not found")]
    NotFound,

    /// Communicating with the store failed or the store rejected the command.
    #[error("store operation failed: {0}")]
    Failed(#[from] FailureCause),
}

impl StoreError {
    /// Returns true for the semantic miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }

    /// Returns true when the handle was already closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, StoreError::Failed(FailureCause::Closed))
    }

    /// Returns the underlying failure cause, if any.
    pub fn cause(&self) -> Option<&FailureCause> {
        match self {
            StoreError::NotFound => None,
            StoreError::Failed(cause) => Some(cause),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Failed(FailureCause::Io(err))
    }
}

/// Underlying reason a store operation failed.
#[derive(Debug, Error)]
pub enum FailureCause {
    /// Network or IO failure while dialing, reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Reply framing could not be parsed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The store answered with an error reply.
    #[error("server error: {0}")]
    Server(String),

    /// The reply type did not match what the command returns.
    #[error("unexpected response to {command}")]
    UnexpectedResponse {
        /// Command whose reply was rejected.
        command: &'static str,
    },

    /// No pooled connection became available in time.
    #[error("timed out after {0:?} waiting for a pooled connection")]
    PoolTimeout(Duration),

    /// The handle was closed.
    #[error("store handle is closed")]
    Closed,

    /// Address did not resolve to a socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Configuration rejected before the pool was built.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
