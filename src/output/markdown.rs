//! Markdown report generation
//!
//! This module renders the collection statistics and the latest run's
//! metrics as a markdown document.

use crate::output::metrics::MetricsSummary;
use crate::output::stats::HarvestStatistics;
use crate::HarvestError;
use std::fs;
use std::path::Path;

/// Writes a markdown report to `output_path`
///
/// # Arguments
///
/// * `stats` - Statistics loaded from storage
/// * `metrics` - Summary of the current run, if any
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(HarvestError)` - Failed to write the report
pub fn write_markdown_report(
    stats: &HarvestStatistics,
    metrics: Option<&MetricsSummary>,
    output_path: &Path,
) -> Result<(), HarvestError> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(output_path, format_markdown_report(stats, metrics))?;
    Ok(())
}

fn push_table(md: &mut String, header: &str, rows: &[(String, u64)]) {
    md.push_str(&format!("| {} | Count |\n", header));
    md.push_str("|---|---|\n");
    for (key, count) in rows {
        md.push_str(&format!("| {} | {} |\n", key, count));
    }
    md.push('\n');
}

/// Formats statistics (and optionally run metrics) as markdown
pub fn format_markdown_report(stats: &HarvestStatistics, metrics: Option<&MetricsSummary>) -> String {
    let mut md = String::new();

    md.push_str("# Council Harvest Report\n\n");

    md.push_str("## Overview\n\n");
    md.push_str(&format!("- **Council members**: {}\n", stats.entities));
    md.push_str(&format!("- **Summary rows**: {}\n", stats.summary_records));
    md.push_str(&format!("- **Document records**: {}\n", stats.detail_records));
    md.push_str(&format!("- **Processed links**: {}\n\n", stats.processed_links));

    if let Some(metrics) = metrics {
        md.push_str("## Run\n\n");
        if let Some(duration) = metrics.session_duration_seconds {
            md.push_str(&format!(
                "- **Duration**: {:.1} seconds ({:.2} minutes)\n",
                duration,
                duration / 60.0
            ));
        }
        md.push_str(&format!(
            "- **Phases**: {} completed, {} failed\n",
            metrics.successful_operations, metrics.failed_operations
        ));
        md.push_str(&format!("- **Requests**: {}\n", metrics.total_requests));
        md.push_str(&format!("- **Errors**: {}\n\n", metrics.total_errors));
    }

    let top = stats.top_entities();
    if !top.is_empty() {
        md.push_str(&format!("## Top {} Members\n\n", top.len()));
        for (rank, (entity, count)) in top.iter().enumerate() {
            md.push_str(&format!("{}. **{}** ({} documents)\n", rank + 1, entity, count));
        }
        md.push('\n');
    }

    if !stats.details_per_entity.is_empty() {
        md.push_str("## Documents per Member\n\n");
        push_table(&mut md, "Member", &stats.details_per_entity);
    }

    if !stats.details_per_category.is_empty() {
        md.push_str("## Documents per Category\n\n");
        push_table(&mut md, "Category", &stats.details_per_category);
    }

    if !stats.summary_totals.is_empty() {
        md.push_str("## Yearly Summary Totals\n\n");
        push_table(&mut md, "Category", &stats.summary_totals);
    }

    md
}
