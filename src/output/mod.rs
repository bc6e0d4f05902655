//! Output module for run metrics, statistics and reports
//!
//! This module handles:
//! - Accumulating run metrics and persisting them as JSON
//! - Loading collection statistics from storage
//! - Printing statistics and exporting a markdown report

mod markdown;
pub mod metrics;
pub mod stats;

pub use markdown::{format_markdown_report, write_markdown_report};
pub use metrics::{MetricsCollector, MetricsSummary};
pub use stats::{load_statistics, print_statistics, HarvestStatistics};
