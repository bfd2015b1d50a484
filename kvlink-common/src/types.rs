//! # Reply Types
//!
//! Typed forms of the replies that carry more than a string: TTL state and
//! scan pages.

use std::time::Duration;

/// Wire sentinel for a key that does not exist.
pub const TTL_MISSING: i64 = -2;

/// Wire sentinel for a key that exists without expiration.
pub const TTL_NO_EXPIRY: i64 = -1;

/// TTL state of a key, mirroring Redis `TTL` semantics.
///
/// `Missing` and `NoExpiry` are kept apart: a caller checking whether a key
/// will ever go away needs to know which one it got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    /// Key is missing or already expired.
    Missing,
    /// Key exists without expiration.
    NoExpiry,
    /// Key expires after the provided duration.
    ExpiresIn(Duration),
}

impl TtlStatus {
    /// Decodes the integer reply of `TTL`.
    ///
    /// Returns `None` for negative values other than the two sentinels.
    pub fn from_reply(value: i64) -> Option<Self> {
        match value {
            TTL_MISSING => Some(TtlStatus::Missing),
            TTL_NO_EXPIRY => Some(TtlStatus::NoExpiry),
            secs if secs >= 0 => Some(TtlStatus::ExpiresIn(Duration::from_secs(secs as u64))),
            _ => None,
        }
    }

    /// Encodes the state as the integer reply of `TTL` (whole seconds).
    pub fn as_reply(&self) -> i64 {
        match self {
            TtlStatus::Missing => TTL_MISSING,
            TtlStatus::NoExpiry => TTL_NO_EXPIRY,
            TtlStatus::ExpiresIn(remaining) => {
                i64::try_from(remaining.as_secs()).unwrap_or(i64::MAX)
            }
        }
    }

    /// Remaining time, if the key has an expiration.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            TtlStatus::ExpiresIn(remaining) => Some(*remaining),
            _ => None,
        }
    }
}

/// One page of a cursor-based scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Keys returned by this call. May be empty while the scan continues.
    pub keys: Vec<String>,
    /// Cursor for the next call; 0 when the pass is complete.
    pub cursor: u64,
}

impl ScanPage {
    /// Returns true when this page ends the pass.
    pub fn is_last(&self) -> bool {
        self.cursor == 0
    }
}
