//! Crawler coordinator - region-by-region crawl orchestration
//!
//! This module contains the main crawl loop, which:
//! - Replays the record store to learn what is already downloaded
//! - Pages through each region's listing in order
//! - Skips stored schools and short-circuits finished regions
//! - Fetches and extracts each new school, appending it immediately
//! - Applies the configured policy when a region fails
//!
//! It also hosts the store-wide rescrape pass.

use crate::config::{Config, CrawlConfig, FailurePolicy};
use crate::crawler::fetcher::Fetcher;
use crate::crawler::paginator::{ListingFilter, ListingPaginator};
use crate::extract::{DetailExtractor, SchoolsnetExtractor};
use crate::model::{FlatRecord, ListingRow, SchoolRecord};
use crate::regions::{select_regions, Borough, Region};
use crate::state::RegionState;
use crate::storage::RecordStore;
use crate::HarvestError;
use std::path::Path;

/// How one region's crawl ended
#[derive(Debug)]
pub struct RegionOutcome {
    pub region: Region,

    /// Borough id when the crawl was restricted to one borough
    pub borough: Option<String>,

    /// `RegionComplete`, `RegionFailed`, or `Paginating` when the run's
    /// record budget ran out mid-region
    pub state: RegionState,

    /// Last total reported by the site, if any page was read
    pub total: Option<usize>,

    /// Records tagged with this region once the crawl stopped
    pub stored: usize,

    /// New records appended during this crawl
    pub fetched: usize,

    /// Rows skipped because their URL was already stored
    pub skipped: usize,

    /// Rows stored with empty details after a per-item failure
    pub failed_items: usize,

    /// The failure that ended the region, if any
    pub error: Option<HarvestError>,
}

impl RegionOutcome {
    fn new(region: &Region, borough: Option<&Borough>, stored: usize) -> Self {
        Self {
            region: *region,
            borough: borough.map(|b| b.id.clone()),
            state: RegionState::LoadingState,
            total: None,
            stored,
            fetched: 0,
            skipped: 0,
            failed_items: 0,
            error: None,
        }
    }

    /// True when the run's record budget stopped this region early
    pub fn budget_exhausted(&self) -> bool {
        self.state == RegionState::Paginating
    }
}

/// Result of a multi-region run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub regions: Vec<RegionOutcome>,

    /// The run stopped because `max-new-records` was reached
    pub budget_exhausted: bool,
}

impl RunSummary {
    pub fn fetched(&self) -> usize {
        self.regions.iter().map(|r| r.fetched).sum()
    }

    pub fn failed_regions(&self) -> usize {
        self.regions
            .iter()
            .filter(|r| r.state == RegionState::RegionFailed)
            .count()
    }
}

/// Result of a rescrape pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RescrapeSummary {
    pub total: usize,
    pub refreshed: usize,
    pub failed: usize,
    pub untouched: usize,
}

/// Main crawler coordinator structure
pub struct Coordinator<E: DetailExtractor = SchoolsnetExtractor> {
    fetcher: Fetcher,
    extractor: E,
    store: RecordStore,
    settings: CrawlConfig,
    new_records: usize,
}

impl<E: DetailExtractor> Coordinator<E> {
    /// Creates a coordinator from already-built parts
    pub fn new(fetcher: Fetcher, extractor: E, store: RecordStore, settings: CrawlConfig) -> Self {
        Self {
            fetcher,
            extractor,
            store,
            settings,
            new_records: 0,
        }
    }

    /// Builds the fetcher and opens the record store named by `config`
    pub fn from_config(config: &Config, extractor: E) -> Result<Self, HarvestError> {
        let fetcher = Fetcher::new(&config.site, &config.fetcher)?;
        let store = RecordStore::open(Path::new(&config.output.store_path))?;
        tracing::info!(
            "Loaded {} stored schools from {}",
            store.len(),
            config.output.store_path
        );
        Ok(Self::new(fetcher, extractor, store, config.crawl.clone()))
    }

    /// Crawls `regions` in order
    ///
    /// A failed region either aborts the run (returning its error) or is
    /// recorded and skipped, depending on the failure policy.
    pub async fn run(&mut self, regions: &[Region]) -> Result<RunSummary, HarvestError> {
        let mut summary = RunSummary::default();

        for region in regions {
            let mut outcome = self.crawl_region(region, None).await?;

            if outcome.state == RegionState::RegionFailed {
                match self.settings.on_region_failure {
                    FailurePolicy::AbortRun => {
                        let error = outcome.error.take().unwrap_or_else(|| HarvestError::Protocol {
                            url: region.name.to_string(),
                            message: "region failed".to_string(),
                        });
                        tracing::error!("[{}] Region failed, aborting run: {}", region.slug(), error);
                        return Err(error);
                    }
                    FailurePolicy::SkipRegion => {
                        tracing::warn!(
                            "[{}] Region failed, continuing with next region: {}",
                            region.slug(),
                            outcome
                                .error
                                .as_ref()
                                .map(|e| e.to_string())
                                .unwrap_or_default()
                        );
                    }
                }
            }

            let budget_exhausted = outcome.budget_exhausted();
            summary.regions.push(outcome);

            if budget_exhausted {
                tracing::info!(
                    "Reached max-new-records ({} new records), stopping run",
                    self.new_records
                );
                summary.budget_exhausted = true;
                break;
            }
        }

        Ok(summary)
    }

    /// Crawls one region, or one borough of it
    ///
    /// Pagination failures end the region and are reported through the
    /// outcome; only record store failures are returned as errors.
    pub async fn crawl_region(
        &mut self,
        region: &Region,
        borough: Option<&Borough>,
    ) -> Result<RegionOutcome, HarvestError> {
        let slug = match borough {
            Some(b) => format!("{}/{}", region.slug(), b.id),
            None => region.slug(),
        };
        let borough_id = borough.map(|b| b.id.as_str());

        let mut completed = self.store.count_region(region.name, borough_id);
        let mut outcome = RegionOutcome::new(region, borough, completed);
        tracing::info!("[{}] {} schools already stored", slug, completed);

        let filter = match borough {
            Some(b) => ListingFilter::borough(region, b),
            None => ListingFilter::region(region),
        };
        let mut paginator = ListingPaginator::new(&self.fetcher, filter, self.settings.start_page);
        advance(&mut outcome.state, RegionState::Paginating, &slug);

        let mut position = 0usize;
        loop {
            let (row, meta) = match paginator.next().await {
                Ok(Some(pair)) => pair,
                Ok(None) => {
                    advance(&mut outcome.state, RegionState::RegionComplete, &slug);
                    break;
                }
                Err(e) => {
                    tracing::error!("[{}] Pagination failed: {}", slug, e);
                    advance(&mut outcome.state, RegionState::RegionFailed, &slug);
                    outcome.error = Some(e);
                    break;
                }
            };
            position += 1;
            outcome.total = Some(meta.total);

            if completed == meta.total {
                tracing::info!(
                    "[{}] scrape already finished. {} downloaded and {} schools total in search",
                    slug,
                    completed,
                    meta.total
                );
                advance(&mut outcome.state, RegionState::RegionComplete, &slug);
                break;
            }

            if self.store.contains(&row.url) {
                advance(&mut outcome.state, RegionState::Skipping, &slug);
                tracing::info!(
                    "[{}] [{} of {}] {} already downloaded",
                    slug,
                    position,
                    meta.total,
                    row.url
                );
                outcome.skipped += 1;
                advance(&mut outcome.state, RegionState::Paginating, &slug);
                continue;
            }

            if self
                .settings
                .max_new_records
                .is_some_and(|max| self.new_records >= max)
            {
                break;
            }

            advance(&mut outcome.state, RegionState::FetchingDetail, &slug);
            let (record, complete) = match self.fetch_record(&row, region, borough).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    tracing::error!("[{}] Fetching {} failed: {}", slug, row.url, e);
                    advance(&mut outcome.state, RegionState::RegionFailed, &slug);
                    outcome.error = Some(e);
                    break;
                }
            };

            advance(&mut outcome.state, RegionState::Appending, &slug);
            self.store.append(record)?;
            completed += 1;
            self.new_records += 1;
            outcome.fetched += 1;
            if !complete {
                outcome.failed_items += 1;
            }
            tracing::info!(
                "[{}] [{} of {}] {} downloaded",
                slug,
                position,
                meta.total,
                row.url
            );
            advance(&mut outcome.state, RegionState::Paginating, &slug);
        }

        outcome.stored = completed;
        tracing::info!(
            "[{}] {}: {} fetched, {} skipped, {} without details",
            slug,
            outcome.state,
            outcome.fetched,
            outcome.skipped,
            outcome.failed_items
        );
        Ok(outcome)
    }

    /// Re-fetches detail fields for stored records and rewrites the store
    ///
    /// With `only_missing`, records that already carry detail fields are
    /// left alone. A record whose refetch fails is kept unchanged.
    pub async fn rescrape(&mut self, only_missing: bool) -> Result<RescrapeSummary, HarvestError> {
        let records = self.store.records().to_vec();
        let mut summary = RescrapeSummary {
            total: records.len(),
            ..Default::default()
        };
        let mut updated = Vec::with_capacity(records.len());

        for (i, record) in records.into_iter().enumerate() {
            let url = match record.url() {
                Some(url) if !(only_missing && record.has_details()) => url.to_string(),
                _ => {
                    summary.untouched += 1;
                    updated.push(record);
                    continue;
                }
            };

            tracing::info!("[{} of {}] rescraping {}", i + 1, summary.total, url);
            match self.fetch_details(&url, false).await {
                Ok(details) => {
                    let mut fresh = SchoolRecord::from_fields(record.listing_fields());
                    fresh.merge_details(details);
                    updated.push(fresh);
                    summary.refreshed += 1;
                }
                Err(e) => {
                    tracing::error!("Rescraping {} failed: {}", url, e);
                    updated.push(record);
                    summary.failed += 1;
                }
            }
        }

        self.store.rewrite(updated)?;
        tracing::info!(
            "Rescrape finished: {} refreshed, {} failed, {} untouched",
            summary.refreshed,
            summary.failed,
            summary.untouched
        );
        Ok(summary)
    }

    /// Builds the record for a listing row
    ///
    /// Per-item failures are logged and yield a record with listing fields
    /// only (`false` in the second slot). Transport failures are returned.
    async fn fetch_record(
        &self,
        row: &ListingRow,
        region: &Region,
        borough: Option<&Borough>,
    ) -> Result<(SchoolRecord, bool), HarvestError> {
        let mut record = SchoolRecord::from_listing(row, region, borough);

        match self.fetch_details(&row.url, true).await {
            Ok(details) => {
                record.merge_details(details);
                Ok((record, true))
            }
            Err(e) if e.is_item_level() => {
                tracing::error!("Storing {} without details: {}", row.url, e);
                Ok((record, false))
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_details(&self, url: &str, use_cache: bool) -> Result<FlatRecord, HarvestError> {
        let page = if use_cache {
            self.fetcher.fetch_detail(url).await?
        } else {
            self.fetcher.refetch_detail(url).await?
        };
        self.extractor.extract(&page.body, url)
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// New records appended by this coordinator so far
    pub fn new_records(&self) -> usize {
        self.new_records
    }
}

/// Moves the region state machine forward
fn advance(state: &mut RegionState, next: RegionState, slug: &str) {
    debug_assert!(
        state.can_transition_to(next),
        "invalid region transition {} -> {}",
        state,
        next
    );
    tracing::debug!("[{}] {} -> {}", slug, state, next);
    *state = next;
}

/// Runs the crawl described by `config`
///
/// Regions come from `crawl.regions` (all of them when empty), in table
/// order.
///
/// # Example
///
/// ```no_run
/// use school_harvester::config::load_config;
/// use school_harvester::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("harvest.toml"))?;
/// let summary = run_crawl(&config).await?;
/// println!("{} new schools", summary.fetched());
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: &Config) -> Result<RunSummary, HarvestError> {
    let regions = select_regions(&config.crawl.regions)?;
    let mut coordinator = Coordinator::from_config(config, SchoolsnetExtractor)?;
    coordinator.run(&regions).await
}
