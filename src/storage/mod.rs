//! Storage module for persisting collected records
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Batched, transactional upserts of entities and records
//! - The processed-link ledger that makes the detailed phase resumable
//! - The append-only operation log

mod batch;
mod dedup;
mod schema;
mod sqlite;
mod traits;

pub use batch::{BatchRecord, BatchWriter};
pub use dedup::{DedupGuard, DedupStats};
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::HarvestError;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage handle shared by the orchestrator, batch writers and dedup guard
pub type SharedStorage = Arc<Mutex<dyn Storage + Send>>;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(HarvestError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// Wraps a backend into a shareable handle
pub fn share<S: Storage + Send + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Locks the shared storage
///
/// Guards must never be held across an `.await`.
pub fn lock(
    storage: &SharedStorage,
) -> StorageResult<MutexGuard<'_, dyn Storage + Send + 'static>> {
    storage.lock().map_err(|_| StorageError::LockPoisoned)
}
