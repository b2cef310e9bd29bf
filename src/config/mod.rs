//! Configuration module for the harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use school_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Crawling {}", config.site.base_url);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlConfig, FailurePolicy, FetcherConfig, OutputConfig, SiteConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
