//! # Client Configuration
//!
//! Connection parameters and pool limits for `StoreClient`. Defaults come
//! from `default_config()`, which builds a fresh value on every call.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use kvlink_common::{FailureCause, StoreResult};

/// Configuration for the store client and its pool.
///
/// Deserializes from any serde format; missing fields take their defaults
/// and durations are written in humantime form (`"30m"`, `"4s"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Server address, e.g. "localhost:6379".
    pub addr: String,
    /// Password sent with `AUTH` on every new connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Logical database selected with `SELECT` when non-zero.
    pub db: u32,
    /// Maximum total connections (idle + in-use).
    pub pool_size: usize,
    /// Idle connections the background worker keeps dialed.
    pub min_idle_conns: usize,
    /// Connections older than this are recycled. Zero disables recycling.
    #[serde(with = "humantime_serde")]
    pub max_conn_age: Duration,
    /// How long `acquire` waits for a free connection.
    #[serde(with = "humantime_serde")]
    pub pool_timeout: Duration,
    /// Idle connections unused for this long are closed. Zero disables it.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// Period of the background reap/warm-up pass.
    #[serde(with = "humantime_serde")]
    pub idle_check_frequency: Duration,
    /// Optional TCP connect timeout.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
    /// Optional TCP read timeout.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    #[serde(with = "humantime_serde")]
    pub write_timeout: Option<Duration>,
}

/// Returns a new configuration holding the default values.
pub fn default_config() -> StoreConfig {
    StoreConfig {
        addr: "localhost:6379".to_string(),
        password: None,
        db: 0,
        pool_size: 10,
        min_idle_conns: 5,
        max_conn_age: Duration::from_secs(30 * 60),
        pool_timeout: Duration::from_secs(4),
        idle_timeout: Duration::from_secs(5 * 60),
        idle_check_frequency: Duration::from_secs(60),
        connect_timeout: Some(Duration::from_secs(5)),
        read_timeout: Some(Duration::from_secs(3)),
        write_timeout: Some(Duration::from_secs(3)),
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        default_config()
    }
}

impl StoreConfig {
    /// Default configuration pointed at `addr`.
    pub fn with_addr(addr: impl Into<String>) -> Self {
        StoreConfig {
            addr: addr.into(),
            ..default_config()
        }
    }

    /// Checks the values the pool cannot work with.
    pub fn validate(&self) -> StoreResult<()> {
        if self.addr.trim().is_empty() {
            return Err(FailureCause::InvalidConfig("addr must not be empty".into()).into());
        }
        if self.pool_size == 0 {
            return Err(FailureCause::InvalidConfig("pool_size must be > 0".into()).into());
        }
        Ok(())
    }

    /// `min_idle_conns` capped at `pool_size`.
    pub fn effective_min_idle(&self) -> usize {
        self.min_idle_conns.min(self.pool_size)
    }
}
