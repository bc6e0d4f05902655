//! Buffered, transactional record persistence
//!
//! A `BatchWriter` accumulates records of one kind and writes them in a
//! single transaction once the buffer reaches its flush threshold, or when
//! `flush` is called at the end of a unit of work.

use crate::model::{DetailRecord, Entity, SummaryRecord};
use crate::storage::{lock, SharedStorage, Storage, StorageResult};
use crate::HarvestError;

/// A record kind that knows how to persist a batch of itself
pub trait BatchRecord: Sized {
    /// Name used in logs and in persistence errors
    const KIND: &'static str;

    fn persist(storage: &mut (dyn Storage + Send), batch: &[Self]) -> StorageResult<usize>;
}

impl BatchRecord for Entity {
    const KIND: &'static str = "entity";

    fn persist(storage: &mut (dyn Storage + Send), batch: &[Self]) -> StorageResult<usize> {
        storage.upsert_entities(batch)
    }
}

impl BatchRecord for SummaryRecord {
    const KIND: &'static str = "summary";

    fn persist(storage: &mut (dyn Storage + Send), batch: &[Self]) -> StorageResult<usize> {
        storage.upsert_summaries(batch)
    }
}

impl BatchRecord for DetailRecord {
    const KIND: &'static str = "detail";

    /// Detail batches also mark their source links processed
    fn persist(storage: &mut (dyn Storage + Send), batch: &[Self]) -> StorageResult<usize> {
        storage.upsert_details(batch)
    }
}

pub struct BatchWriter<R: BatchRecord> {
    storage: SharedStorage,
    buffer: Vec<R>,
    flush_threshold: usize,
    written: usize,
    flushes: usize,
}

impl<R: BatchRecord> BatchWriter<R> {
    pub fn new(storage: SharedStorage, flush_threshold: usize) -> Self {
        let flush_threshold = flush_threshold.max(1);
        Self {
            storage,
            buffer: Vec::with_capacity(flush_threshold),
            flush_threshold,
            written: 0,
            flushes: 0,
        }
    }

    /// Buffers a record, flushing when the threshold is reached
    pub fn add(&mut self, record: R) -> Result<(), HarvestError> {
        self.buffer.push(record);
        if self.buffer.len() >= self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes every buffered record in one transaction
    ///
    /// On failure the transaction is rolled back and the buffered batch is
    /// discarded; previously flushed batches are unaffected.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of rows inserted or updated
    /// * `Err(HarvestError::Persistence)` - The batch was rolled back
    pub fn flush(&mut self) -> Result<usize, HarvestError> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let batch = std::mem::take(&mut self.buffer);
        let written = lock(&self.storage)
            .and_then(|mut storage| R::persist(&mut *storage, &batch))
            .map_err(|source| {
                tracing::error!("Dropping batch of {} {} record(s): {}", batch.len(), R::KIND, source);
                HarvestError::Persistence {
                    kind: R::KIND,
                    source,
                }
            })?;

        self.written += written;
        self.flushes += 1;
        tracing::debug!("Flushed {} {} record(s)", batch.len(), R::KIND);
        Ok(written)
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Rows written by successful flushes so far
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }
}
