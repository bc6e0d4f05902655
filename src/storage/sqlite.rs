//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.
//! Every batch upsert runs inside a single transaction; dropping the
//! transaction on an error rolls the whole batch back.

use crate::model::{DetailRecord, Entity, OperationRecord, SummaryRecord};
use crate::state::OperationStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::HarvestError;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file; missing parent
    ///   directories are created
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn grouped_counts(&self, sql: &str) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((key, count as u64))
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }
}

/// Raw operation_log row before timestamp and status decoding
struct OperationRow {
    id: i64,
    operation: String,
    status: String,
    details: Option<String>,
    started_at: String,
    finished_at: Option<String>,
    duration_seconds: Option<f64>,
    error_message: Option<String>,
}

const OPERATION_COLUMNS: &str =
    "id, operation, status, details, started_at, finished_at, duration_seconds, error_message";

fn read_operation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OperationRow> {
    Ok(OperationRow {
        id: row.get(0)?,
        operation: row.get(1)?,
        status: row.get(2)?,
        details: row.get(3)?,
        started_at: row.get(4)?,
        finished_at: row.get(5)?,
        duration_seconds: row.get(6)?,
        error_message: row.get(7)?,
    })
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::CorruptRow(format!("bad timestamp '{}': {}", value, e)))
}

impl TryFrom<OperationRow> for OperationRecord {
    type Error = StorageError;

    fn try_from(row: OperationRow) -> StorageResult<Self> {
        let status = OperationStatus::from_db_string(&row.status).ok_or_else(|| {
            StorageError::CorruptRow(format!("unknown operation status '{}'", row.status))
        })?;

        Ok(OperationRecord {
            id: row.id,
            operation: row.operation,
            status,
            started_at: parse_timestamp(&row.started_at)?,
            finished_at: row.finished_at.as_deref().map(parse_timestamp).transpose()?,
            duration_seconds: row.duration_seconds,
            details: row.details,
            error_message: row.error_message,
        })
    }
}

impl Storage for SqliteStorage {
    // ===== Entities =====

    fn upsert_entities(&mut self, entities: &[Entity]) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO entities (name, affiliation, profile_link, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(name) DO UPDATE SET
                     affiliation = excluded.affiliation,
                     profile_link = excluded.profile_link,
                     updated_at = excluded.updated_at",
            )?;
            for entity in entities {
                written += stmt.execute(params![
                    entity.name,
                    entity.affiliation,
                    entity.profile_link,
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    fn load_entities(&self) -> StorageResult<Vec<Entity>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, affiliation, profile_link FROM entities ORDER BY name")?;

        let rows = stmt.query_map([], |row| {
            Ok(Entity {
                name: row.get(0)?,
                affiliation: row.get(1)?,
                profile_link: row.get(2)?,
            })
        })?;

        let mut entities = Vec::new();
        for row in rows {
            entities.push(row?);
        }
        Ok(entities)
    }

    // ===== Summary Records =====

    fn upsert_summaries(&mut self, records: &[SummaryRecord]) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO summary_records (entity, category, year, count, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(entity, category, year) DO UPDATE SET
                     count = excluded.count,
                     updated_at = excluded.updated_at",
            )?;
            for record in records {
                written += stmt.execute(params![
                    record.entity,
                    record.category,
                    record.year,
                    record.count,
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    fn load_summaries(&self, entity: &str) -> StorageResult<Vec<SummaryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity, category, year, count FROM summary_records
             WHERE entity = ?1 ORDER BY year, category",
        )?;

        let rows = stmt.query_map(params![entity], |row| {
            Ok(SummaryRecord {
                entity: row.get(0)?,
                category: row.get(1)?,
                year: row.get(2)?,
                count: row.get(3)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    // ===== Detail Records =====

    fn upsert_details(&mut self, records: &[DetailRecord]) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut upsert = tx.prepare(
                "INSERT INTO detail_records (entity, category, status, record_date, source_link, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(entity, category, record_date) DO UPDATE SET
                     status = excluded.status,
                     source_link = excluded.source_link,
                     updated_at = excluded.updated_at",
            )?;
            let mut mark = tx.prepare(
                "INSERT OR IGNORE INTO processed_links (entity, link, processed, processed_at)
                 VALUES (?1, ?2, 1, ?3)",
            )?;
            for record in records {
                written += upsert.execute(params![
                    record.entity,
                    record.category,
                    record.status,
                    record.date.format(DATE_FORMAT).to_string(),
                    record.source_link,
                    now
                ])?;
                mark.execute(params![record.entity, record.source_link, now])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    fn load_details(&self, entity: &str) -> StorageResult<Vec<DetailRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity, category, status, record_date, source_link FROM detail_records
             WHERE entity = ?1 ORDER BY record_date, category",
        )?;

        let rows = stmt.query_map(params![entity], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (entity, category, status, date, source_link) = row?;
            let date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
                .map_err(|e| StorageError::CorruptRow(format!("bad date '{}': {}", date, e)))?;
            records.push(DetailRecord {
                entity,
                category,
                status,
                date,
                source_link,
            });
        }
        Ok(records)
    }

    // ===== Processed Links =====

    fn is_link_processed(&self, entity: &str, link: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM processed_links WHERE entity = ?1 AND link = ?2 AND processed = 1",
                params![entity, link],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn mark_link_processed(&mut self, entity: &str, link: &str) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO processed_links (entity, link, processed, processed_at)
             VALUES (?1, ?2, 1, ?3)",
            params![entity, link, now],
        )?;
        Ok(inserted > 0)
    }

    fn count_processed_links(&self, entity: Option<&str>) -> StorageResult<u64> {
        let count: i64 = match entity {
            Some(entity) => self.conn.query_row(
                "SELECT COUNT(*) FROM processed_links WHERE entity = ?1",
                params![entity],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM processed_links", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }

    // ===== Operation Log =====

    fn begin_operation(&mut self, operation: &str, details: Option<&str>) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO operation_log (operation, status, details, started_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                operation,
                OperationStatus::Running.to_db_string(),
                details,
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_operation(
        &mut self,
        id: i64,
        status: OperationStatus,
        details: Option<&str>,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        let current = self.get_operation(id)?;
        if current.status.is_final() {
            return Err(StorageError::OperationFinalized(id));
        }

        let finished_at = Utc::now();
        let duration = (finished_at - current.started_at).num_milliseconds() as f64 / 1000.0;

        let updated = self.conn.execute(
            "UPDATE operation_log
             SET status = ?1,
                 details = COALESCE(?2, details),
                 finished_at = ?3,
                 duration_seconds = ?4,
                 error_message = ?5
             WHERE id = ?6 AND status = ?7",
            params![
                status.to_db_string(),
                details,
                finished_at.to_rfc3339(),
                duration.max(0.0),
                error_message,
                id,
                OperationStatus::Running.to_db_string()
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::OperationFinalized(id));
        }
        Ok(())
    }

    fn get_operation(&self, id: i64) -> StorageResult<OperationRecord> {
        let sql = format!("SELECT {} FROM operation_log WHERE id = ?1", OPERATION_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], read_operation_row)
            .optional()?
            .ok_or(StorageError::OperationNotFound(id))?;

        OperationRecord::try_from(row)
    }

    fn recent_operations(&self, limit: usize) -> StorageResult<Vec<OperationRecord>> {
        let sql = format!(
            "SELECT {} FROM operation_log ORDER BY id DESC LIMIT ?1",
            OPERATION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], read_operation_row)?;

        let mut operations = Vec::new();
        for row in rows {
            operations.push(OperationRecord::try_from(row?)?);
        }
        Ok(operations)
    }

    // ===== Statistics =====

    fn count_entities(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM entities")
    }

    fn count_summaries(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM summary_records")
    }

    fn count_details(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM detail_records")
    }

    fn details_per_entity(&self) -> StorageResult<Vec<(String, u64)>> {
        self.grouped_counts(
            "SELECT entity, COUNT(*) AS total FROM detail_records
             GROUP BY entity ORDER BY total DESC, entity",
        )
    }

    fn details_per_category(&self) -> StorageResult<Vec<(String, u64)>> {
        self.grouped_counts(
            "SELECT category, COUNT(*) AS total FROM detail_records
             GROUP BY category ORDER BY total DESC, category",
        )
    }

    fn summary_totals_per_category(&self) -> StorageResult<Vec<(String, u64)>> {
        self.grouped_counts(
            "SELECT category, SUM(count) AS total FROM summary_records
             GROUP BY category ORDER BY total DESC, category",
        )
    }

    // ===== Lifecycle =====

    fn release(&mut self) -> StorageResult<()> {
        self.conn
            .execute_batch("PRAGMA optimize; PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}
