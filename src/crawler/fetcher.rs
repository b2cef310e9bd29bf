//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with the configured user agent and timeouts
//! - Bounded retry for connection-level failures
//! - The optional response cache for detail pages
//! - Detecting detail requests that were silently redirected home
//!
//! One `Fetcher` is built per process and handed to the paginator and the
//! orchestrator; nothing in here is global.

use crate::config::{FetcherConfig, SiteConfig};
use crate::storage::ResponseCache;
use crate::HarvestError;
use reqwest::{Client, StatusCode};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

/// Paths the site serves its landing page on
const HOME_PATHS: [&str; 3] = ["/", "/index.html", "/index.htm"];

/// A fetched response body
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: Url,

    /// HTTP status code
    pub status_code: u16,

    /// Response body
    pub body: String,

    /// True when the body came from the response cache
    pub from_cache: bool,
}

/// Outcome of a single attempt
enum Attempt {
    /// Worth another try (connection reset, timeout, gateway error)
    Transient(String),

    /// Retrying will not help
    Fatal(HarvestError),
}

/// HTTP client with retry policy and optional response cache
pub struct Fetcher {
    client: Client,
    base_url: Url,
    max_retries: u32,
    retry_delay: Duration,
    cache: Option<Mutex<ResponseCache>>,
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `site` - The target site configuration (user agent)
/// * `fetcher` - Timeout settings
pub fn build_http_client(
    site: &SiteConfig,
    fetcher: &FetcherConfig,
) -> Result<Client, reqwest::Error> {
    let timeout = Duration::from_secs(fetcher.timeout_secs);

    Client::builder()
        .user_agent(site.user_agent.clone())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

impl Fetcher {
    /// Creates a fetcher from configuration, opening the cache if one is set
    pub fn new(site: &SiteConfig, fetcher: &FetcherConfig) -> Result<Self, HarvestError> {
        let client = build_http_client(site, fetcher)?;
        let base_url = Url::parse(&site.base_url)?;

        let cache = match &fetcher.cache_path {
            Some(path) => {
                let cache = ResponseCache::new(std::path::Path::new(path))?;
                tracing::info!("Using response cache at {} ({} pages)", path, cache.len()?);
                Some(Mutex::new(cache))
            }
            None => None,
        };

        Ok(Self {
            client,
            base_url,
            max_retries: fetcher.max_retries,
            retry_delay: Duration::from_millis(fetcher.retry_delay_ms),
            cache,
        })
    }

    /// Replaces the response cache
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(Mutex::new(cache));
        self
    }

    /// The site root every relative link is resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves a site-relative path or href to an absolute URL
    pub fn resolve(&self, href: &str) -> Result<Url, HarvestError> {
        Ok(self.base_url.join(href)?)
    }

    /// Issues a GET with bounded retry on connection-level failures
    ///
    /// Any status other than a gateway error (502/503/504) is returned as-is
    /// so the caller can inspect the site's own error pages.
    pub async fn get(&self, url: &Url) -> Result<FetchedPage, HarvestError> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.attempt(url).await {
                Ok(page) => return Ok(page),
                Err(Attempt::Transient(message)) if attempt <= self.max_retries => {
                    let delay = backoff_delay(self.retry_delay, attempt);
                    tracing::warn!(
                        "Attempt {} for {} failed ({}), retrying in {:?}",
                        attempt,
                        url,
                        message,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(Attempt::Transient(message)) => {
                    return Err(HarvestError::Transport {
                        url: url.to_string(),
                        attempts: attempt,
                        message,
                    })
                }
                Err(Attempt::Fatal(e)) => return Err(e),
            }
        }
    }

    /// Fetches a school detail page
    ///
    /// Served from the cache when present. A non-success status is a
    /// protocol error and a redirect to the home page is a redirect error;
    /// neither is cached.
    pub async fn fetch_detail(&self, url: &str) -> Result<FetchedPage, HarvestError> {
        self.detail(url, true).await
    }

    /// Fetches a detail page from the network even when it is cached
    ///
    /// A successful response still replaces the cached body.
    pub async fn refetch_detail(&self, url: &str) -> Result<FetchedPage, HarvestError> {
        self.detail(url, false).await
    }

    async fn detail(&self, url: &str, read_cache: bool) -> Result<FetchedPage, HarvestError> {
        let requested = Url::parse(url)?;

        if read_cache {
            if let Some(body) = self.cache_get(url) {
                tracing::debug!("Cache hit for {}", url);
                return Ok(FetchedPage {
                    final_url: requested,
                    status_code: 200,
                    body,
                    from_cache: true,
                });
            }
        }

        let page = self.get(&requested).await?;

        if self.is_home_redirect(&requested, &page.final_url) {
            return Err(HarvestError::Redirect {
                url: url.to_string(),
                final_url: page.final_url.to_string(),
                reason: "landed on the home page".to_string(),
            });
        }

        if !(200..300).contains(&page.status_code) {
            return Err(HarvestError::Protocol {
                url: url.to_string(),
                message: format!("HTTP {}", page.status_code),
            });
        }

        self.cache_put(url, &page.body);
        Ok(page)
    }

    /// True when `requested` was not the home page but `final_url` is
    pub fn is_home_redirect(&self, requested: &Url, final_url: &Url) -> bool {
        let is_home = |u: &Url| {
            u.host_str() == self.base_url.host_str()
                && u.port_or_known_default() == self.base_url.port_or_known_default()
                && HOME_PATHS.contains(&u.path())
                && u.query().map_or(true, str::is_empty)
        };
        !is_home(requested) && is_home(final_url)
    }

    async fn attempt(&self, url: &Url) -> Result<FetchedPage, Attempt> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ) {
            return Err(Attempt::Transient(format!("HTTP {}", status.as_u16())));
        }

        let final_url = response.url().clone();
        let body = response.text().await.map_err(|e| classify(url, e))?;

        Ok(FetchedPage {
            final_url,
            status_code: status.as_u16(),
            body,
            from_cache: false,
        })
    }

    fn cache_get(&self, url: &str) -> Option<String> {
        let cache = self.cache.as_ref()?;
        let guard = match cache.lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("Response cache lock poisoned, bypassing cache");
                return None;
            }
        };
        match guard.get(url) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Response cache read failed for {}: {}", url, e);
                None
            }
        }
    }

    fn cache_put(&self, url: &str, body: &str) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let result = cache
            .lock()
            .map_err(|_| crate::StorageError::Poisoned)
            .and_then(|guard| guard.put(url, body));
        if let Err(e) = result {
            tracing::warn!("Response cache write failed for {}: {}", url, e);
        }
    }
}

/// Linear backoff: `base * attempt`, saturating instead of overflowing
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

/// Sorts a reqwest error into retryable and fatal
///
/// Redirect and decode failures are tied to the requested page, so they
/// map onto the per-page error kinds rather than a generic client error.
fn classify(url: &Url, error: reqwest::Error) -> Attempt {
    if error.is_timeout() {
        Attempt::Transient("request timeout".to_string())
    } else if error.is_connect() {
        Attempt::Transient(format!("connection failed: {}", error))
    } else if error.is_redirect() {
        Attempt::Fatal(HarvestError::Redirect {
            url: url.to_string(),
            final_url: error
                .url()
                .map_or_else(|| url.to_string(), |u| u.to_string()),
            reason: "redirects could not be followed".to_string(),
        })
    } else if error.is_decode() {
        Attempt::Fatal(HarvestError::Protocol {
            url: url.to_string(),
            message: format!("undecodable response body: {}", error),
        })
    } else if error.is_request() || error.is_body() {
        Attempt::Transient(error.to_string())
    } else {
        Attempt::Fatal(HarvestError::Reqwest(error))
    }
}
