use serde::Deserialize;

/// Main configuration structure for the harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    pub output: OutputConfig,
}

/// Target site configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Scheme and host of the school directory, e.g. "http://www.schoolsnet.com"
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

/// HTTP fetcher behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Extra attempts after the first one for connection-level failures
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between attempts (milliseconds); grows linearly per attempt
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Whole-request timeout in seconds
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// SQLite file caching detail page bodies; no cache when absent
    #[serde(rename = "cache-path", default)]
    pub cache_path: Option<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_timeout_secs(),
            cache_path: None,
        }
    }
}

/// Crawl behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// First listing page to request for every region
    #[serde(rename = "start-page", default = "default_start_page")]
    pub start_page: u32,

    /// What a failed region does to the rest of the run
    #[serde(rename = "on-region-failure", default)]
    pub on_region_failure: FailurePolicy,

    /// Restrict the run to these region names; all regions when empty
    #[serde(default)]
    pub regions: Vec<String>,

    /// Stop cleanly after this many new records have been appended
    #[serde(rename = "max-new-records", default)]
    pub max_new_records: Option<usize>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            start_page: default_start_page(),
            on_region_failure: FailurePolicy::default(),
            regions: Vec::new(),
            max_new_records: None,
        }
    }
}

/// Propagation of a hard pagination failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// The failure ends the whole multi-region run
    #[default]
    AbortRun,

    /// The failed region is recorded and the next region starts
    SkipRegion,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the line-delimited record store
    #[serde(rename = "store-path")]
    pub store_path: String,

    /// Directory receiving CSV exports
    #[serde(rename = "export-dir")]
    pub export_dir: String,
}

fn default_user_agent() -> String {
    format!("school-harvester/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_start_page() -> u32 {
    1
}
