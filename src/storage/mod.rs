//! Storage module for persisting crawl data
//!
//! This module handles:
//! - The append-only record store and its replay into a url index
//! - Store maintenance (compaction, atomic rewrite)
//! - The optional SQLite response cache used by the fetcher

mod cache;
mod record_store;
mod schema;

pub use cache::ResponseCache;
pub use record_store::{RecordStore, StorageResult};
pub use crate::StorageError;
