use crate::config::types::{Config, CrawlConfig, FetcherConfig, OutputConfig, SiteConfig};
use crate::regions::find_region;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_crawl_config(&config.crawl)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the target site
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' has no host",
            config.base_url
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Upper bound on the base retry delay (ten minutes)
const MAX_RETRY_DELAY_MS: u64 = 600_000;

/// Validates fetcher limits
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be at most 10, got {}",
            config.max_retries
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.retry_delay_ms > MAX_RETRY_DELAY_MS {
        return Err(ConfigError::Validation(format!(
            "retry-delay-ms must be at most {}, got {}",
            MAX_RETRY_DELAY_MS, config.retry_delay_ms
        )));
    }

    if let Some(path) = &config.cache_path {
        if path.is_empty() {
            return Err(ConfigError::Validation(
                "cache-path cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates crawl settings
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.start_page < 1 {
        return Err(ConfigError::Validation(
            "start-page must be >= 1".to_string(),
        ));
    }

    for name in &config.regions {
        if find_region(name).is_none() {
            return Err(ConfigError::Validation(format!(
                "Unknown region '{}' in crawl.regions",
                name
            )));
        }
    }

    if config.max_new_records == Some(0) {
        return Err(ConfigError::Validation(
            "max-new-records must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.store_path.is_empty() {
        return Err(ConfigError::Validation(
            "store-path cannot be empty".to_string(),
        ));
    }

    if config.export_dir.is_empty() {
        return Err(ConfigError::Validation(
            "export-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}
