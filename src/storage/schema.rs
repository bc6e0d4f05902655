//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Council-Harvest database.
//! Every table declares the natural unique key its upsert resolves conflicts on.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Council members, keyed by name
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(name) > 0),
    affiliation TEXT NOT NULL,
    profile_link TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(name)
);

-- Yearly document counts per member and category
CREATE TABLE IF NOT EXISTS summary_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity TEXT NOT NULL CHECK (length(entity) > 0),
    category TEXT NOT NULL CHECK (length(category) > 0),
    year TEXT NOT NULL,
    count INTEGER NOT NULL CHECK (count >= 0),
    updated_at TEXT NOT NULL,
    UNIQUE(entity, category, year)
);

CREATE INDEX IF NOT EXISTS idx_summary_records_entity ON summary_records(entity);

-- Individual document metadata; status is the mutable field
CREATE TABLE IF NOT EXISTS detail_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity TEXT NOT NULL CHECK (length(entity) > 0),
    category TEXT NOT NULL CHECK (length(category) > 0),
    status TEXT NOT NULL,
    record_date TEXT NOT NULL,
    source_link TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(entity, category, record_date)
);

CREATE INDEX IF NOT EXISTS idx_detail_records_entity ON detail_records(entity);
CREATE INDEX IF NOT EXISTS idx_detail_records_date ON detail_records(record_date);

-- Resources already handled; a row means "skip on future runs"
CREATE TABLE IF NOT EXISTS processed_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity TEXT NOT NULL,
    link TEXT NOT NULL,
    processed INTEGER NOT NULL DEFAULT 1,
    processed_at TEXT NOT NULL,
    UNIQUE(entity, link)
);

-- Append-only run and phase log
CREATE TABLE IF NOT EXISTS operation_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL,
    status TEXT NOT NULL,
    details TEXT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    duration_seconds REAL,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_operation_log_operation ON operation_log(operation);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
