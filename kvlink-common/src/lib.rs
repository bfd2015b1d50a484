// kvlink-common - Shared types and the store interface for KvLink
//
// This crate defines the backend-agnostic operation set that the remote
// client and the in-memory store both implement.

pub mod error;
pub mod pattern;
pub mod store;
pub mod types;

// Re-export for convenience
pub use error::*;
pub use pattern::glob_match;
pub use store::KeyValueStore;
pub use types::*;
