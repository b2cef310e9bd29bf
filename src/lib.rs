//! School Harvester: an incremental school-directory crawler
//!
//! This crate crawls a public school directory region by region, extracts
//! per-school detail records, appends them to a line-delimited record log
//! and exports the accumulated dataset as CSV. Runs are resumable: the
//! record log is replayed on startup and already-downloaded schools are
//! never fetched twice.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod model;
pub mod output;
pub mod regions;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Connection-level failure that survived the retry budget
    #[error("Transport error for {url} after {attempts} attempt(s): {message}")]
    Transport {
        url: String,
        attempts: u32,
        message: String,
    },

    /// The site served its own error page
    #[error("Site reported an error for {url}: {message}")]
    Protocol { url: String, message: String },

    /// An expected structural marker is missing from a listing page
    #[error("Unexpected page structure at {url}: {message}")]
    Parse { url: String, message: String },

    /// A single detail page could not be turned into a record
    #[error("Failed to extract details from {url}: {message}")]
    Extraction { url: String, message: String },

    /// A detail fetch landed on the site's home page or never settled
    #[error("Request for {url} was redirected ({reason}), ending at {final_url}")]
    Redirect {
        url: String,
        final_url: String,
        reason: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Unknown region: {0}")]
    UnknownRegion(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Returns true for failures scoped to a single detail page
    ///
    /// These are caught by the orchestrator and downgraded to a record with
    /// empty detail fields instead of failing the region.
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            Self::Extraction { .. } | Self::Redirect { .. } | Self::Protocol { .. }
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Record store and response cache errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Malformed record on line {line} of {path}: {source}")]
    MalformedLine {
        path: String,
        line: usize,
        source: serde_json::Error,
    },

    #[error("Record on line {line} of {path} has no url field")]
    MissingUrl { path: String, line: usize },

    #[error("A record for {0} is already stored")]
    DuplicateUrl(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache database error: {0}")]
    Cache(#[from] rusqlite::Error),

    #[error("Cache lock poisoned")]
    Poisoned,
}

/// Result type alias for harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

// Re-export commonly used types
pub use config::Config;
pub use model::{ListingRow, PageMeta, SchoolRecord};
pub use regions::{Borough, Region, REGIONS};
pub use state::RegionState;
