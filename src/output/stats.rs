//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! collection statistics from the storage layer.

use crate::storage::Storage;
use crate::HarvestError;

/// Collection statistics summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestStatistics {
    /// Number of stored council members
    pub entities: u64,

    /// Number of stored yearly summary rows
    pub summary_records: u64,

    /// Number of stored document records
    pub detail_records: u64,

    /// Number of links marked processed
    pub processed_links: u64,

    /// Document records per member, descending
    pub details_per_entity: Vec<(String, u64)>,

    /// Document records per category, descending
    pub details_per_category: Vec<(String, u64)>,

    /// Sum of yearly counts per category, descending
    pub summary_totals: Vec<(String, u64)>,

    /// How many entries the top rankings keep
    pub top_n: usize,
}

impl HarvestStatistics {
    /// The `top_n` members with the most document records
    pub fn top_entities(&self) -> &[(String, u64)] {
        let n = self.top_n.min(self.details_per_entity.len());
        &self.details_per_entity[..n]
    }

    /// The `top_n` most frequent document categories
    pub fn top_categories(&self) -> &[(String, u64)] {
        let n = self.top_n.min(self.details_per_category.len());
        &self.details_per_category[..n]
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `top_n` - Size of the top rankings
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage, top_n: usize) -> Result<HarvestStatistics, HarvestError> {
    Ok(HarvestStatistics {
        entities: storage.count_entities()?,
        summary_records: storage.count_summaries()?,
        detail_records: storage.count_details()?,
        processed_links: storage.count_processed_links(None)?,
        details_per_entity: storage.details_per_entity()?,
        details_per_category: storage.details_per_category()?,
        summary_totals: storage.summary_totals_per_category()?,
        top_n,
    })
}

/// Prints statistics to stdout in a human-readable format
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Council members: {}", stats.entities);
    println!("  Summary rows: {}", stats.summary_records);
    println!("  Document records: {}", stats.detail_records);
    println!("  Processed links: {}", stats.processed_links);
    println!();

    if !stats.details_per_entity.is_empty() {
        println!("Documents per Member:");
        for (entity, count) in &stats.details_per_entity {
            println!("  {}: {}", entity, count);
        }
        println!();
    }

    if !stats.details_per_category.is_empty() {
        println!("Documents per Category:");
        for (category, count) in &stats.details_per_category {
            let percentage = if stats.detail_records > 0 {
                (*count as f64 / stats.detail_records as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", category, count, percentage);
        }
        println!();
    }

    if !stats.summary_totals.is_empty() {
        println!("Yearly Summary Totals per Category:");
        for (category, total) in &stats.summary_totals {
            println!("  {}: {}", category, total);
        }
        println!();
    }

    let top = stats.top_entities();
    if !top.is_empty() {
        println!("Top {} Members:", top.len());
        for (rank, (entity, count)) in top.iter().enumerate() {
            println!("  {}. {} ({} documents)", rank + 1, entity, count);
        }
    }
}
