//! # keel-plugins
//!
//! Store extensions built entirely on the [`StoreHost`] capability surface
//! from `keel-store`:
//!
//! - [`HistoryPlugin`]: bounded undo/redo stacks with optional debounced
//!   grouping and optional persistence.
//! - [`PersistPlugin`]: hydrate from storage at init, save a filtered
//!   versioned envelope on every commit.
//! - [`SyncPlugin`]: best-effort state broadcast across store instances.
//!
//! Because the plugins only see `StoreHost`, they work against any
//! store-like implementation of that trait, not just `keel_store::Store`.
//!
//! [`StoreHost`]: keel_store::StoreHost

pub mod history;
pub mod persist;
pub mod sync;

pub use history::{HistoryEntry, HistoryOptions, HistoryPlugin, UNKNOWN_ACTION};
pub use persist::{MigrateFn, PersistOptions, PersistPlugin};
pub use sync::{MemoryBus, SyncBus, SyncMessage, SyncPlugin};
