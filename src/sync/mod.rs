//! Master/slave synchronization.

mod engine;
mod last_sync;

pub use engine::{SyncEngine, SyncResult};
pub use last_sync::{LastSyncStore, MemoryLastSyncStore};
