//! # KvLink Client
//!
//! Purpose: Provide a lightweight, synchronous client for a Redis-compatible
//! key-value store, with connection pooling to amortize TCP handshakes.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse TCP connections to avoid repeated connects.
//! 2. **Narrow Interface**: Callers program against `KeyValueStore`; the
//!    pooled client is one implementation of it.
//! 3. **Minimal Allocation**: Reuse buffers for RESP framing and parsing.
//! 4. **Protocol Clarity**: Encode/parse RESP2 explicitly for correctness.
//!
//! ```no_run
//! use kvlink_client::{default_config, KeyValueStore, StoreClient};
//!
//! let client = StoreClient::connect(default_config())?;
//! client.set("greeting", "hello")?;
//! assert_eq!(client.get("greeting")?, "hello");
//! client.close()?;
//! # Ok::<(), kvlink_client::StoreError>(())
//! ```

mod client;
mod config;
mod pool;
mod resp;

pub use client::StoreClient;
pub use config::{default_config, StoreConfig};
pub use pool::PoolStats;

pub use kvlink_common::{
    FailureCause, KeyValueStore, ScanPage, StoreError, StoreResult, TtlStatus,
};
