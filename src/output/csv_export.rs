//! Tabular export of the record store
//!
//! The header is the key set of the first record with the most fields.
//! Cells for keys a record lacks are empty; keys outside the header are
//! dropped and counted.

use crate::model::SchoolRecord;
use crate::storage::RecordStore;
use crate::HarvestError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File written when the export is not split by region
pub const COMBINED_FILE: &str = "schools.csv";

/// What an export wrote
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub files: Vec<PathBuf>,
    pub records: usize,

    /// Field values left out because their key was not in the header
    pub dropped_fields: usize,
}

/// Column names for `records`
///
/// Uses the first record with the most fields; ties go to the earlier one.
pub fn header_for(records: &[SchoolRecord]) -> Vec<String> {
    let widest = records
        .iter()
        .fold(None::<&SchoolRecord>, |best, record| match best {
            Some(b) if b.len() >= record.len() => Some(b),
            _ => Some(record),
        });

    widest
        .map(|r| r.fields().keys().cloned().collect())
        .unwrap_or_default()
}

/// Writes `records` as CSV to `writer`
///
/// Returns the number of field values that did not fit the header.
pub fn write_csv<W: Write>(records: &[SchoolRecord], writer: W) -> Result<usize, HarvestError> {
    let header = header_for(records);
    let mut csv = csv::Writer::from_writer(writer);
    let mut dropped = 0usize;

    if header.is_empty() {
        csv.flush()?;
        return Ok(0);
    }

    csv.write_record(&header)?;
    for record in records {
        let row: Vec<String> = header.iter().map(|key| cell(record.get(key))).collect();
        csv.write_record(&row)?;

        dropped += record
            .fields()
            .keys()
            .filter(|key| !header.contains(key))
            .count();
    }
    csv.flush()?;

    Ok(dropped)
}

/// Exports the store at `store_path` into `export_dir`
///
/// Writes `schools.csv`, or one `<region>.csv` per region when
/// `split_by_region` is set. The store file is only read.
pub fn export_store(
    store_path: &Path,
    export_dir: &Path,
    split_by_region: bool,
) -> Result<ExportReport, HarvestError> {
    let records = RecordStore::load(store_path)?;
    fs::create_dir_all(export_dir)?;

    let mut report = ExportReport {
        records: records.len(),
        ..Default::default()
    };

    let groups: Vec<(String, Vec<SchoolRecord>)> = if split_by_region {
        group_by_region(records)
    } else {
        vec![(COMBINED_FILE.to_string(), records)]
    };

    for (file_name, group) in groups {
        let path = export_dir.join(file_name);
        let file = fs::File::create(&path)?;
        let dropped = write_csv(&group, std::io::BufWriter::new(file))?;
        if dropped > 0 {
            tracing::warn!(
                "{} field value(s) missing from the header were left out of {}",
                dropped,
                path.display()
            );
        }
        tracing::info!("Wrote {} records to {}", group.len(), path.display());
        report.dropped_fields += dropped;
        report.files.push(path);
    }

    Ok(report)
}

/// Splits records into `<region>.csv` groups, in first-seen region order
fn group_by_region(records: Vec<SchoolRecord>) -> Vec<(String, Vec<SchoolRecord>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: BTreeMap<String, Vec<SchoolRecord>> = BTreeMap::new();

    for record in records {
        let name = format!("{}.csv", file_stem(record.region()));
        if !groups.contains_key(&name) {
            order.push(name.clone());
        }
        groups.entry(name).or_default().push(record);
    }

    order
        .into_iter()
        .filter_map(|name| groups.remove(&name).map(|group| (name, group)))
        .collect()
}

fn file_stem(region: Option<&str>) -> String {
    match region {
        Some(name) if !name.trim().is_empty() => name
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect(),
        _ => "unknown_region".to_string(),
    }
}

/// Renders one value: null is empty, strings are raw, the rest is JSON
fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
