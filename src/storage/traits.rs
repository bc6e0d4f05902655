//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::model::{DetailRecord, Entity, OperationRecord, SummaryRecord};
use crate::state::OperationStatus;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Operation not found: {0}")]
    OperationNotFound(i64),

    #[error("Operation {0} is already finalized")]
    OperationFinalized(i64),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Upserts take a whole batch and apply it atomically: either every record
/// of the batch is stored or none is.
pub trait Storage {
    // ===== Entities =====

    /// Inserts or updates entities keyed on `name`
    ///
    /// Returns the number of rows inserted or updated.
    fn upsert_entities(&mut self, entities: &[Entity]) -> StorageResult<usize>;

    /// Loads every stored entity, ordered by name
    fn load_entities(&self) -> StorageResult<Vec<Entity>>;

    // ===== Summary Records =====

    /// Inserts or overwrites yearly counts keyed on `(entity, category, year)`
    fn upsert_summaries(&mut self, records: &[SummaryRecord]) -> StorageResult<usize>;

    /// Loads the summary records of one entity
    fn load_summaries(&self, entity: &str) -> StorageResult<Vec<SummaryRecord>>;

    // ===== Detail Records =====

    /// Inserts detail records keyed on `(entity, category, date)`, updating
    /// `status` on conflict, and marks each record's `source_link`
    /// processed in the same transaction
    fn upsert_details(&mut self, records: &[DetailRecord]) -> StorageResult<usize>;

    /// Loads the detail records of one entity, ordered by date
    fn load_details(&self, entity: &str) -> StorageResult<Vec<DetailRecord>>;

    // ===== Processed Links =====

    /// Point lookup: has this resource already been handled for the entity?
    fn is_link_processed(&self, entity: &str, link: &str) -> StorageResult<bool>;

    /// Insert-or-ignore; returns true only when a new row was written
    fn mark_link_processed(&mut self, entity: &str, link: &str) -> StorageResult<bool>;

    /// Counts processed links, optionally for a single entity
    fn count_processed_links(&self, entity: Option<&str>) -> StorageResult<u64>;

    // ===== Operation Log =====

    /// Appends a `running` operation row and returns its ID
    fn begin_operation(&mut self, operation: &str, details: Option<&str>) -> StorageResult<i64>;

    /// Finalizes a running operation row
    ///
    /// Fails with `OperationFinalized` if the row was already finalized.
    fn finish_operation(
        &mut self,
        id: i64,
        status: OperationStatus,
        details: Option<&str>,
        error_message: Option<&str>,
    ) -> StorageResult<()>;

    /// Gets an operation row by ID
    fn get_operation(&self, id: i64) -> StorageResult<OperationRecord>;

    /// Gets the most recent operation rows, newest first
    fn recent_operations(&self, limit: usize) -> StorageResult<Vec<OperationRecord>>;

    // ===== Statistics =====

    fn count_entities(&self) -> StorageResult<u64>;

    fn count_summaries(&self) -> StorageResult<u64>;

    fn count_details(&self) -> StorageResult<u64>;

    /// Detail record count per entity, descending
    fn details_per_entity(&self) -> StorageResult<Vec<(String, u64)>>;

    /// Detail record count per category, descending
    fn details_per_category(&self) -> StorageResult<Vec<(String, u64)>>;

    /// Sum of summary counts per category, descending
    fn summary_totals_per_category(&self) -> StorageResult<Vec<(String, u64)>>;

    // ===== Lifecycle =====

    /// Flushes pending state and releases what the backend can release
    /// before the handle is dropped
    fn release(&mut self) -> StorageResult<()>;
}
