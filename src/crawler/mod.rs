//! Crawler module for listing traversal and detail harvesting
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry logic and the response cache
//! - Search-result and region-map page parsing
//! - Lazy pagination over a region's listing
//! - Overall crawl coordination and rescrape passes

mod coordinator;
mod fetcher;
mod listing;
mod paginator;

pub use coordinator::{run_crawl, Coordinator, RegionOutcome, RescrapeSummary, RunSummary};
pub use fetcher::{build_http_client, FetchedPage, Fetcher};
pub use listing::{
    normalize_address, parse_boroughs, parse_listing_page, parse_total, ListingPage,
    ERROR_MARKER, NO_RESULTS_MARKER,
};
pub use paginator::{fetch_boroughs, ListingFilter, ListingPaginator};
