//! Listing and record types shared by the paginator, orchestrator and store

use crate::regions::{Borough, Region};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A flat, insertion-ordered `field -> value` mapping
pub type FlatRecord = Map<String, Value>;

pub const URL_FIELD: &str = "url";
pub const NAME_FIELD: &str = "name";
pub const ADDRESS_FIELD: &str = "full_address";
pub const REGION_FIELD: &str = "region";
pub const BOROUGH_FIELD: &str = "borough";

/// Fields a record gets from the listing page rather than the detail page
const LISTING_FIELDS: [&str; 5] = [
    NAME_FIELD,
    URL_FIELD,
    ADDRESS_FIELD,
    REGION_FIELD,
    BOROUGH_FIELD,
];

/// One school as shown on a search results page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRow {
    pub name: String,

    /// Absolute detail-page URL; the record's stable identifier
    pub url: String,

    pub full_address: String,
}

/// Per-page metadata from the result-count banner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMeta {
    /// Authoritative number of schools matching the active filter
    pub total: usize,
}

/// A persisted school record
///
/// The field set is open: listing fields, the region tag and whatever the
/// detail extractor produced. `url` is the primary key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchoolRecord {
    fields: FlatRecord,
}

impl SchoolRecord {
    /// Builds a record holding the listing fields and region tag only
    pub fn from_listing(row: &ListingRow, region: &Region, borough: Option<&Borough>) -> Self {
        let mut fields = FlatRecord::new();
        fields.insert(NAME_FIELD.to_string(), Value::String(row.name.clone()));
        fields.insert(URL_FIELD.to_string(), Value::String(row.url.clone()));
        fields.insert(
            ADDRESS_FIELD.to_string(),
            Value::String(row.full_address.clone()),
        );
        fields.insert(
            REGION_FIELD.to_string(),
            Value::String(region.name.to_string()),
        );
        if let Some(borough) = borough {
            fields.insert(BOROUGH_FIELD.to_string(), Value::String(borough.id.clone()));
        }
        Self { fields }
    }

    /// Wraps an already-flat mapping
    pub fn from_fields(fields: FlatRecord) -> Self {
        Self { fields }
    }

    /// Overlays detail fields onto the record
    ///
    /// The `url` key is never replaced, and a null detail value does not
    /// clobber a value the record already has.
    pub fn merge_details(&mut self, details: FlatRecord) {
        for (key, value) in details {
            if key == URL_FIELD {
                continue;
            }
            if value.is_null() && self.fields.get(&key).is_some_and(|v| !v.is_null()) {
                continue;
            }
            self.fields.insert(key, value);
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.fields.get(URL_FIELD).and_then(Value::as_str)
    }

    pub fn region(&self) -> Option<&str> {
        self.fields.get(REGION_FIELD).and_then(Value::as_str)
    }

    pub fn borough(&self) -> Option<&str> {
        self.fields.get(BOROUGH_FIELD).and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Listing-level fields only, without anything from a detail page
    pub fn listing_fields(&self) -> FlatRecord {
        self.fields
            .iter()
            .filter(|(k, _)| LISTING_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// True when at least one field came from a detail page
    pub fn has_details(&self) -> bool {
        self.fields
            .keys()
            .any(|k| !LISTING_FIELDS.contains(&k.as_str()))
    }

    pub fn fields(&self) -> &FlatRecord {
        &self.fields
    }

    pub fn into_fields(self) -> FlatRecord {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
