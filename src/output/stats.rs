//! Statistics over the record store
//!
//! This module provides functionality for summarizing what a store holds
//! and printing it for the `stats` command.

use crate::model::SchoolRecord;
use crate::regions::REGIONS;
use std::collections::HashMap;

/// Per-region record counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionCount {
    pub region: String,
    pub records: usize,

    /// Records carrying listing fields only
    pub without_details: usize,
}

/// Store statistics summary
#[derive(Debug, Clone, Default)]
pub struct StoreStatistics {
    /// Lines in the store file, duplicates included
    pub lines: usize,

    /// Unique records
    pub records: usize,

    /// Records carrying listing fields only
    pub without_details: usize,

    /// Counts in region-table order, then any unknown regions by name
    pub regions: Vec<RegionCount>,
}

impl StoreStatistics {
    /// Lines that a compaction would remove
    pub fn superseded_lines(&self) -> usize {
        self.lines.saturating_sub(self.records)
    }
}

/// Computes statistics for de-duplicated `records` read from `lines` lines
pub fn collect_statistics(records: &[SchoolRecord], lines: usize) -> StoreStatistics {
    let mut by_region: HashMap<String, RegionCount> = HashMap::new();
    let mut without_details = 0usize;

    for record in records {
        let name = record.region().unwrap_or("(none)").to_string();
        let entry = by_region.entry(name.clone()).or_insert_with(|| RegionCount {
            region: name,
            ..Default::default()
        });
        entry.records += 1;
        if !record.has_details() {
            entry.without_details += 1;
            without_details += 1;
        }
    }

    let mut regions = Vec::with_capacity(by_region.len());
    for region in REGIONS.iter() {
        if let Some(count) = by_region.remove(region.name) {
            regions.push(count);
        }
    }
    let mut unknown: Vec<RegionCount> = by_region.into_values().collect();
    unknown.sort_by(|a, b| a.region.cmp(&b.region));
    regions.extend(unknown);

    StoreStatistics {
        lines,
        records: records.len(),
        without_details,
        regions,
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &StoreStatistics) {
    println!("=== Record Store Statistics ===\n");

    println!("Overview:");
    println!("  Unique schools: {}", stats.records);
    println!("  Lines in store: {}", stats.lines);
    println!("  Superseded lines: {}", stats.superseded_lines());
    println!("  Without details: {}", stats.without_details);
    println!();

    println!("Schools by Region:");
    for count in &stats.regions {
        let percentage = if stats.records > 0 {
            (count.records as f64 / stats.records as f64) * 100.0
        } else {
            0.0
        };
        println!(
            "  {}: {} ({:.1}%), {} without details",
            count.region, count.records, percentage, count.without_details
        );
    }
    println!();

    let detailed = stats.records - stats.without_details;
    let success_rate = if stats.records > 0 {
        (detailed as f64 / stats.records as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "Detail Rate: {:.1}% ({} / {} schools with details)",
        success_rate, detailed, stats.records
    );
}
