//! # keel-storage
//!
//! The flat key → JSON-blob storage boundary used by the persistence
//! plugins. Deliberately tiny: a key either holds a string blob or it does
//! not. No hierarchy and no transactions; envelope formats and migration
//! live with the callers.
//!
//! Callers in the plugin layer treat every storage failure as best-effort:
//! log and carry on, never throw into the state-transition path.

pub mod error;
pub mod file;
pub mod memory;

pub use error::StorageError;
pub use file::FileStorage;
pub use memory::MemoryStorage;

/// A flat key/value blob store.
///
/// Implementations must be `Send + Sync`; plugins hold them behind an
/// `Arc<dyn Storage>`.
pub trait Storage: Send + Sync {
    /// Read the blob under `key`. `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write the blob under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete the blob under `key`. Absent keys are not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}
