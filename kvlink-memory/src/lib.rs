//! # KvLink In-Memory Store
//!
//! Purpose: Provide an in-process `KeyValueStore` with the same observable
//! semantics as a remote Redis-compatible server, for callers that want to
//! swap the network away (tests, embedded use).

mod memory;

pub use memory::{ExpirationHandle, MemoryStore, DEFAULT_SCAN_COUNT};
