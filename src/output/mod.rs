//! Output module for exports and store summaries
//!
//! This module handles:
//! - Exporting the record store as CSV, combined or per region
//! - Summarizing the store for the `stats` command

mod csv_export;
pub mod stats;

pub use csv_export::{export_store, header_for, write_csv, ExportReport, COMBINED_FILE};
pub use stats::{collect_statistics, print_statistics, RegionCount, StoreStatistics};

use crate::storage::RecordStore;
use crate::HarvestError;
use std::path::Path;

/// Loads statistics for the store at `path`
///
/// The store is only read, never repaired, so this is safe next to a
/// running crawl.
///
/// # Arguments
///
/// * `path` - The record store file
///
/// # Returns
///
/// * `Ok(StoreStatistics)` - Successfully replayed the store
/// * `Err(HarvestError)` - The store is missing or malformed
pub fn load_statistics(path: &Path) -> Result<StoreStatistics, HarvestError> {
    if !path.exists() {
        return Err(HarvestError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("record store {} does not exist", path.display()),
        )));
    }

    let (records, lines) = RecordStore::load_counted(path)?;
    Ok(collect_statistics(&records, lines))
}
