//! Static region table
//!
//! The directory partitions schools into nine top-level regions. The order of
//! [`REGIONS`] is the crawl order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A top-level directory region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    /// Human-readable name, also stored in each record's `region` field
    pub name: &'static str,

    /// The site's `p_region_id` value
    pub id: u32,
}

impl Region {
    /// Lowercase, underscore-separated form of the name ("north_west")
    pub fn slug(&self) -> String {
        self.name.to_lowercase().replace(' ', "_")
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// All regions in crawl order
pub const REGIONS: [Region; 9] = [
    Region { name: "Scotland", id: 1 },
    Region { name: "Wales", id: 2 },
    Region { name: "Northern Ireland", id: 3 },
    Region { name: "East Anglia", id: 4 },
    Region { name: "Greater London", id: 5 },
    Region { name: "Midlands", id: 6 },
    Region { name: "North", id: 7 },
    Region { name: "North West", id: 8 },
    Region { name: "South East", id: 9 },
];

/// Looks a region up by name (case-insensitive) or slug
pub fn find_region(name: &str) -> Option<Region> {
    let wanted = name.trim();
    REGIONS
        .iter()
        .find(|r| r.name.eq_ignore_ascii_case(wanted) || r.slug() == wanted)
        .copied()
}

/// Resolves a list of names to regions, keeping table order
///
/// An empty list selects every region.
pub fn select_regions(names: &[String]) -> Result<Vec<Region>, crate::HarvestError> {
    if names.is_empty() {
        return Ok(REGIONS.to_vec());
    }

    let mut wanted = Vec::with_capacity(names.len());
    for name in names {
        let region =
            find_region(name).ok_or_else(|| crate::HarvestError::UnknownRegion(name.clone()))?;
        wanted.push(region);
    }

    Ok(REGIONS
        .iter()
        .filter(|r| wanted.contains(r))
        .copied()
        .collect())
}

/// A sub-region (local education authority) inside a region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Borough {
    /// The site's `p_lea_id` value
    pub id: String,
    pub name: String,
    pub url: String,
}
