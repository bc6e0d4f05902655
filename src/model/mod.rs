//! Domain records collected from the source
//!
//! Every record is validated when it is built at the extraction boundary,
//! so anything that reaches a `BatchWriter` already satisfies the storage
//! constraints.

pub mod text;

use crate::state::OperationStatus;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

/// Errors raised while building a record from extracted page data
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("entity name cannot be empty")]
    EmptyName,

    #[error("category cannot be empty")]
    EmptyCategory,

    #[error("year cannot be empty")]
    EmptyYear,

    #[error("unparseable count '{0}'")]
    InvalidCount(String),

    #[error("unparseable date '{0}'")]
    InvalidDate(String),
}

/// A council member, keyed by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub name: String,
    pub affiliation: String,
    pub profile_link: Option<String>,
}

impl Entity {
    pub fn new(
        name: &str,
        affiliation: &str,
        profile_link: Option<&str>,
    ) -> Result<Self, RecordError> {
        let name = text::clean_text(name);
        if name.is_empty() {
            return Err(RecordError::EmptyName);
        }

        Ok(Self {
            name,
            affiliation: text::clean_text(affiliation),
            profile_link: profile_link
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        })
    }
}

/// Yearly document count of one category for one entity
///
/// Unique per `(entity, category, year)`; `count` is overwritten on conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRecord {
    pub entity: String,
    pub category: String,
    pub year: String,
    pub count: u32,
}

impl SummaryRecord {
    pub fn new(entity: &str, category: &str, year: &str, count: u32) -> Result<Self, RecordError> {
        let category = text::clean_text(category);
        let year = year.trim().to_string();
        if entity.trim().is_empty() {
            return Err(RecordError::EmptyName);
        }
        if category.is_empty() {
            return Err(RecordError::EmptyCategory);
        }
        if year.is_empty() {
            return Err(RecordError::EmptyYear);
        }

        Ok(Self {
            entity: entity.trim().to_string(),
            category,
            year,
            count,
        })
    }
}

/// Metadata of a single document
///
/// Unique per `(entity, category, date)`; `status` is the mutable field.
/// `source_link` is the resource the record was extracted from; persisting
/// the record marks that link processed in the same transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailRecord {
    pub entity: String,
    pub category: String,
    pub status: String,
    pub date: NaiveDate,
    pub source_link: String,
}

impl DetailRecord {
    pub fn new(
        entity: &str,
        category: &str,
        status: &str,
        date: NaiveDate,
        source_link: &str,
    ) -> Result<Self, RecordError> {
        let category = text::clean_text(category);
        if entity.trim().is_empty() {
            return Err(RecordError::EmptyName);
        }
        if category.is_empty() {
            return Err(RecordError::EmptyCategory);
        }

        Ok(Self {
            entity: entity.trim().to_string(),
            category,
            status: text::clean_text(status),
            date,
            source_link: source_link.to_string(),
        })
    }
}

/// One row of the operation log
#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub id: i64,
    pub operation: String,
    pub status: OperationStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub details: Option<String>,
    pub error_message: Option<String>,
}
