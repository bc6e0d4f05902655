//! Processed-link ledger lookups
//!
//! The guard answers "has this resource already been handled for this
//! entity?" with a point lookup against storage, so it works the same on
//! the first run and after a crash.

use crate::storage::{lock, SharedStorage, StorageResult};

/// Counters kept by a `DedupGuard` over its lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    pub checked: u64,
    pub already_processed: u64,
    pub marked: u64,
}

pub struct DedupGuard {
    storage: SharedStorage,
    stats: DedupStats,
}

impl DedupGuard {
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            storage,
            stats: DedupStats::default(),
        }
    }

    pub fn is_processed(&mut self, entity: &str, link: &str) -> StorageResult<bool> {
        let processed = lock(&self.storage)?.is_link_processed(entity, link)?;
        self.stats.checked += 1;
        if processed {
            self.stats.already_processed += 1;
        }
        Ok(processed)
    }

    /// Idempotent; marking an already processed link is a no-op
    pub fn mark_processed(&mut self, entity: &str, link: &str) -> StorageResult<()> {
        if lock(&self.storage)?.mark_link_processed(entity, link)? {
            self.stats.marked += 1;
        }
        Ok(())
    }

    pub fn stats(&self) -> DedupStats {
        self.stats
    }
}
