//! Durable key/value storage for vault snapshots
//!
//! ```text
//! KeyValueStore (JsonFileStore | MemoryStore) → PersistenceStore → Vault
//! ```
//!
//! Backends only move opaque strings. `PersistenceStore` owns the fixed key
//! and the snapshot format, including the per-field overlay on load.

pub mod file;
pub mod memory;
pub mod snapshot;

use crate::error::Result;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use snapshot::{PartialVaultState, PersistenceStore};

/// Raw key/value backend
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite the value stored under `key`
    fn set(&self, key: &str, value: &str) -> Result<()>;
}
