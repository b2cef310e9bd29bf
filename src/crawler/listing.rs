//! Search-result and region-map page parsing
//!
//! This module turns the site's listing HTML into typed values:
//! - end-of-results and error-page detection
//! - the "Your search yielded N schools" banner
//! - one `ListingRow` per result block
//! - the borough list on a region's map page

use crate::model::{ListingRow, PageMeta};
use crate::regions::Borough;
use crate::HarvestError;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use url::Url;

/// Body text of a search with nothing (more) to show
pub const NO_RESULTS_MARKER: &str = "Unfortunately, your search yielded no results.";

/// Body text of the site's generic error page
pub const ERROR_MARKER: &str = "An unexpected problem";

/// One parsed search-results page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingPage {
    /// A page of results
    Rows { rows: Vec<ListingRow>, meta: PageMeta },

    /// The no-results marker: the listing is exhausted
    NoResults,
}

/// Parses a search-results page
///
/// # Arguments
///
/// * `html` - The page body
/// * `page_url` - The URL the body was served from (for error messages)
/// * `base_url` - Site root that detail hrefs are resolved against
///
/// # Errors
///
/// * `Protocol` - the page is the site's error page
/// * `Parse` - the result-count banner is missing
pub fn parse_listing_page(
    html: &str,
    page_url: &Url,
    base_url: &Url,
) -> Result<ListingPage, HarvestError> {
    if html.contains(NO_RESULTS_MARKER) {
        return Ok(ListingPage::NoResults);
    }

    let document = Html::parse_document(html);

    if html.contains(ERROR_MARKER) {
        let message = first_text(&document, "#errorDetails")
            .unwrap_or_else(|| "site returned its error page without details".to_string());
        return Err(HarvestError::Protocol {
            url: page_url.to_string(),
            message,
        });
    }

    let total = parse_total(&document).ok_or_else(|| HarvestError::Parse {
        url: page_url.to_string(),
        message: "result-count banner 'Your search yielded N schools' not found".to_string(),
    })?;

    let rows = extract_rows(&document, base_url);

    Ok(ListingPage::Rows {
        rows,
        meta: PageMeta { total },
    })
}

/// Reads the result count from the element preceding `p.ViewResult`
pub fn parse_total(document: &Html) -> Option<usize> {
    let view_result = Selector::parse("p.ViewResult").ok()?;
    let banner = document
        .select(&view_result)
        .next()?
        .prev_siblings()
        .find_map(ElementRef::wrap)?;

    let text: String = banner.text().collect();
    let captures = total_pattern().captures(&text)?;
    captures.get(1)?.as_str().parse().ok()
}

/// Joins address fragments into one line
///
/// Newlines and runs of whitespace inside or between fragments collapse to
/// a single space; empty fragments disappear.
///
/// # Example
///
/// ```
/// use school_harvester::crawler::normalize_address;
///
/// let line = normalize_address(["12 High St", "", "Townsville "]);
/// assert_eq!(line, "12 High St Townsville");
/// ```
pub fn normalize_address<I, S>(fragments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut words = Vec::new();
    for fragment in fragments {
        words.extend(fragment.as_ref().split_whitespace().map(str::to_string));
    }
    words.join(" ")
}

/// Parses the borough links on a region's map page
pub fn parse_boroughs(html: &str, base_url: &Url) -> Vec<Borough> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("#schoolsguide ol > li > a") else {
        return Vec::new();
    };

    let mut boroughs = Vec::new();
    for link in document.select(&selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Ok(url) = base_url.join(href) else {
            tracing::debug!("Skipping unresolvable borough href {}", href);
            continue;
        };
        let Some(id) = url
            .query_pairs()
            .find(|(k, _)| k == "p_lea_id")
            .map(|(_, v)| v.into_owned())
        else {
            continue;
        };

        boroughs.push(Borough {
            id,
            name: link.text().collect::<String>().trim().to_string(),
            url: url.to_string(),
        });
    }

    boroughs
}

/// Extracts one row per `table.leasearch dl` block
fn extract_rows(document: &Html, base_url: &Url) -> Vec<ListingRow> {
    let (Ok(block_selector), Ok(link_selector), Ok(dd_selector)) = (
        Selector::parse("table.leasearch dl"),
        Selector::parse("dt > a"),
        Selector::parse("dd"),
    ) else {
        return Vec::new();
    };

    let mut rows = Vec::new();
    for block in document.select(&block_selector) {
        let Some(link) = block.select(&link_selector).next() else {
            tracing::warn!("Listing block without a school link, skipping");
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            tracing::warn!("School link without href, skipping");
            continue;
        };
        let url = match base_url.join(href) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Unresolvable school href {}: {}", href, e);
                continue;
            }
        };

        let fragments: Vec<String> = block
            .select(&dd_selector)
            .map(|dd| format!("{} {}", dd.text().collect::<String>(), tail_text(dd)))
            .collect();

        rows.push(ListingRow {
            name: link.text().collect::<String>().trim().to_string(),
            url: url.to_string(),
            full_address: normalize_address(&fragments),
        });
    }

    rows
}

/// Text directly following an element, up to the next element
fn tail_text(element: ElementRef<'_>) -> String {
    element
        .next_siblings()
        .map_while(|node| {
            node.value().as_text().map(|text| {
                let text: &str = text;
                text.to_string()
            })
        })
        .collect()
}

/// Whitespace-collapsed text of the first element matching `css`
fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    let element = document.select(&selector).next()?;
    let text: Vec<String> = element.text().map(str::to_string).collect();
    Some(normalize_address(&text)).filter(|s| !s.is_empty())
}

fn total_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Your search yielded (\d+) schools").expect("static pattern compiles")
    })
}
