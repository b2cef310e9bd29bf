//! Listing paginator
//!
//! Walks the search results for one region (optionally one borough) page by
//! page, yielding `(ListingRow, PageMeta)` pairs in listing order. The
//! sequence ends normally on the site's no-results page; error pages and
//! layout changes surface as errors and end it as well.

use crate::crawler::fetcher::Fetcher;
use crate::crawler::listing::{
    parse_boroughs, parse_listing_page, ListingPage, ERROR_MARKER, NO_RESULTS_MARKER,
};
use crate::model::{ListingRow, PageMeta};
use crate::regions::{Borough, Region};
use crate::HarvestError;
use std::collections::VecDeque;
use url::Url;

const SEARCH_PATH: &str = "/uk-schools/search/search-schools.html";
const REGION_MAP_PATH: &str = "/pls/hot_school/sn_search.obj_pls_schools_search_bymap";

/// Institution types included in every search
const SCHOOL_TYPES: [&str; 7] = ["0", "1", "2", "3", "5", "6", "8"];

/// Session token the search form always sends
const SEARCH_TOKEN: &str = "16180339";

/// Region/borough restriction for a search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingFilter {
    pub region_id: u32,
    pub borough_id: Option<String>,
}

impl ListingFilter {
    pub fn region(region: &Region) -> Self {
        Self {
            region_id: region.id,
            borough_id: None,
        }
    }

    pub fn borough(region: &Region, borough: &Borough) -> Self {
        Self {
            region_id: region.id,
            borough_id: Some(borough.id.clone()),
        }
    }
}

/// Lazy, restartable iterator over a region's search results
pub struct ListingPaginator<'a> {
    fetcher: &'a Fetcher,
    filter: ListingFilter,
    next_page: u32,
    buffer: VecDeque<ListingRow>,
    meta: Option<PageMeta>,
    finished: bool,
}

impl<'a> ListingPaginator<'a> {
    /// Creates a paginator starting at `start_page` (1-based)
    pub fn new(fetcher: &'a Fetcher, filter: ListingFilter, start_page: u32) -> Self {
        Self {
            fetcher,
            filter,
            next_page: start_page.max(1),
            buffer: VecDeque::new(),
            meta: None,
            finished: false,
        }
    }

    /// Returns the next row with the metadata of the page it came from
    ///
    /// `Ok(None)` means the listing is exhausted. After an error the
    /// paginator is finished as well.
    pub async fn next(&mut self) -> Result<Option<(ListingRow, PageMeta)>, HarvestError> {
        loop {
            if let Some(meta) = self.meta {
                if let Some(row) = self.buffer.pop_front() {
                    return Ok(Some((row, meta)));
                }
            }

            if self.finished {
                return Ok(None);
            }

            let page = self.next_page;
            match self.fetch_page(page).await {
                Ok(ListingPage::NoResults) => {
                    tracing::debug!("No more results after page {}", page.saturating_sub(1));
                    self.finished = true;
                }
                Ok(ListingPage::Rows { rows, meta }) => {
                    self.next_page += 1;
                    if rows.is_empty() {
                        tracing::warn!(
                            "Page {} has a result banner but no listings, stopping",
                            page
                        );
                        self.finished = true;
                    } else {
                        self.meta = Some(meta);
                        self.buffer.extend(rows);
                    }
                }
                Err(e) => {
                    self.finished = true;
                    return Err(e);
                }
            }
        }
    }

    /// Fetches and parses one results page
    pub async fn fetch_page(&self, page: u32) -> Result<ListingPage, HarvestError> {
        let url = self.search_url(page)?;
        let fetched = self.fetcher.get(&url).await?;

        let success = (200..300).contains(&fetched.status_code);
        if !success
            && !fetched.body.contains(ERROR_MARKER)
            && !fetched.body.contains(NO_RESULTS_MARKER)
        {
            return Err(HarvestError::Protocol {
                url: fetched.final_url.to_string(),
                message: format!("HTTP {}", fetched.status_code),
            });
        }

        let parsed = parse_listing_page(&fetched.body, &fetched.final_url, self.fetcher.base_url())?;

        match &parsed {
            ListingPage::Rows { rows, meta } => tracing::info!(
                "Scraping page {}: {} ({} listed, {} total)",
                page,
                fetched.final_url,
                rows.len(),
                meta.total
            ),
            ListingPage::NoResults => {
                tracing::info!("Scraping page {}: {} (no results)", page, fetched.final_url)
            }
        }

        Ok(parsed)
    }

    /// Builds the search URL for `page`
    pub fn search_url(&self, page: u32) -> Result<Url, HarvestError> {
        let mut url = self.fetcher.resolve(SEARCH_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            for school_type in SCHOOL_TYPES {
                query.append_pair("schooltype", school_type);
            }
            query
                .append_pair("entry_gender", "-1")
                .append_pair("gender_of_sixth_form", "-1")
                .append_pair("type_of_institution", "-1")
                .append_pair("a", "220708")
                .append_pair("x", SEARCH_TOKEN)
                .append_pair("y", "")
                .append_pair("p_region_id", &self.filter.region_id.to_string())
                .append_pair("p_lea_id", self.filter.borough_id.as_deref().unwrap_or(""))
                .append_pair("search", "Search")
                .append_pair("pageno", &page.to_string());
        }
        Ok(url)
    }

    pub fn is_finished(&self) -> bool {
        self.finished && self.buffer.is_empty()
    }
}

/// Lists the boroughs of a region from its map page
pub async fn fetch_boroughs(
    fetcher: &Fetcher,
    region: &Region,
) -> Result<Vec<Borough>, HarvestError> {
    let mut url = fetcher.resolve(REGION_MAP_PATH)?;
    url.query_pairs_mut()
        .append_pair("x", SEARCH_TOKEN)
        .append_pair("p_region_id", &region.id.to_string());

    let fetched = fetcher.get(&url).await?;
    if !(200..300).contains(&fetched.status_code) {
        return Err(HarvestError::Protocol {
            url: fetched.final_url.to_string(),
            message: format!("HTTP {}", fetched.status_code),
        });
    }

    let boroughs = parse_boroughs(&fetched.body, fetcher.base_url());
    tracing::info!("Found {} boroughs in {}", boroughs.len(), region);
    Ok(boroughs)
}
