//! Run metrics accumulator
//!
//! The only mutable part of a `RunContext`. Written to JSON during Cleanup.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One timed operation (a phase)
#[derive(Debug, Clone, Serialize)]
pub struct OperationMetric {
    pub name: String,
    pub duration_seconds: f64,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// One recorded error with the place it happened
#[derive(Debug, Clone, Serialize)]
pub struct ErrorMetric {
    pub error: String,
    pub context: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Derived view of the collected metrics
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSummary {
    pub session_duration_seconds: Option<f64>,
    pub total_operations: usize,
    pub successful_operations: usize,
    pub failed_operations: usize,
    pub total_requests: u64,
    pub total_errors: usize,
    pub data_collected: BTreeMap<String, u64>,
    pub avg_operation_seconds: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsCollector {
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    operations: Vec<OperationMetric>,
    errors: Vec<ErrorMetric>,
    requests_count: u64,
    data_collected: BTreeMap<String, u64>,
}

/// Serialized form: raw metrics plus the derived summary
#[derive(Serialize)]
struct MetricsReport<'a> {
    #[serde(flatten)]
    metrics: &'a MetricsCollector,
    summary: MetricsSummary,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_session(&mut self) {
        self.start_time = Some(Utc::now());
        self.end_time = None;
    }

    pub fn end_session(&mut self) {
        self.end_time = Some(Utc::now());
    }

    pub fn record_operation(&mut self, name: &str, duration_seconds: f64, success: bool) {
        self.operations.push(OperationMetric {
            name: name.to_string(),
            duration_seconds,
            success,
            timestamp: Utc::now(),
        });
    }

    pub fn record_error(&mut self, error: impl ToString, context: Option<&str>) {
        self.errors.push(ErrorMetric {
            error: error.to_string(),
            context: context.map(str::to_string),
            timestamp: Utc::now(),
        });
    }

    pub fn add_requests(&mut self, count: u64) {
        self.requests_count += count;
    }

    /// Sets a data-collected counter, replacing any previous value
    pub fn set_data_collected(&mut self, key: &str, count: u64) {
        self.data_collected.insert(key.to_string(), count);
    }

    pub fn operations(&self) -> &[OperationMetric] {
        &self.operations
    }

    pub fn errors(&self) -> &[ErrorMetric] {
        &self.errors
    }

    pub fn requests(&self) -> u64 {
        self.requests_count
    }

    pub fn data_collected(&self, key: &str) -> Option<u64> {
        self.data_collected.get(key).copied()
    }

    pub fn summary(&self) -> MetricsSummary {
        let session_duration_seconds = match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        };

        let successful: Vec<&OperationMetric> =
            self.operations.iter().filter(|op| op.success).collect();
        let avg_operation_seconds = if successful.is_empty() {
            0.0
        } else {
            successful.iter().map(|op| op.duration_seconds).sum::<f64>() / successful.len() as f64
        };

        MetricsSummary {
            session_duration_seconds,
            total_operations: self.operations.len(),
            successful_operations: successful.len(),
            failed_operations: self.operations.len() - successful.len(),
            total_requests: self.requests_count,
            total_errors: self.errors.len(),
            data_collected: self.data_collected.clone(),
            avg_operation_seconds,
        }
    }

    /// Writes pretty JSON to `dir/metrics_<timestamp>.json`
    ///
    /// # Returns
    ///
    /// * `Ok(PathBuf)` - Path of the written file
    /// * `Err(HarvestError)` - Failed to create the directory or write the file
    pub fn save_to_file(&self, dir: &Path) -> crate::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let stamp = self.end_time.unwrap_or_else(Utc::now);
        let path = dir.join(format!("metrics_{}.json", stamp.format("%Y%m%d_%H%M%S")));

        let report = MetricsReport {
            metrics: self,
            summary: self.summary(),
        };
        fs::write(&path, serde_json::to_string_pretty(&report)?)?;

        Ok(path)
    }
}
