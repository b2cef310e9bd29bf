//! Detail page extraction
//!
//! A `DetailExtractor` turns one school page into a flat record. The
//! orchestrator only depends on the trait; `SchoolsnetExtractor` knows the
//! directory's markup.

use crate::model::FlatRecord;
use crate::HarvestError;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

/// Turns a detail page into a flat `field -> value` record
///
/// Missing optional sections should come back as null or absent fields,
/// not as an error. An error means the document is not a school page at all.
pub trait DetailExtractor {
    fn extract(&self, document: &str, url: &str) -> Result<FlatRecord, HarvestError>;
}

impl<F> DetailExtractor for F
where
    F: Fn(&str, &str) -> Result<FlatRecord, HarvestError>,
{
    fn extract(&self, document: &str, url: &str) -> Result<FlatRecord, HarvestError> {
        self(document, url)
    }
}

const ADDRESS_BLOCK: &str = r#"#contentcolumn div[itemprop="address"]"#;

/// Schema.org properties read from the address block, with their field names
const ADDRESS_PROPERTIES: [(&str, &str); 5] = [
    ("name", "name"),
    ("street_address", "streetAddress"),
    ("locality", "addressLocality"),
    ("postal_code", "postalCode"),
    ("telephone", "telephone"),
];

/// Extractor for the school directory's detail pages
#[derive(Debug, Clone, Copy, Default)]
pub struct SchoolsnetExtractor;

impl DetailExtractor for SchoolsnetExtractor {
    fn extract(&self, document: &str, url: &str) -> Result<FlatRecord, HarvestError> {
        let html = Html::parse_document(document);

        let content = selector("#contentcolumn", url)?;
        if html.select(&content).next().is_none() {
            return Err(HarvestError::Extraction {
                url: url.to_string(),
                message: "page has no #contentcolumn section".to_string(),
            });
        }

        let mut record = FlatRecord::new();
        for (field, property) in ADDRESS_PROPERTIES {
            let css = format!(r#"{} span[itemprop="{}"]"#, ADDRESS_BLOCK, property);
            let value = html
                .select(&selector(&css, url)?)
                .next()
                .and_then(element_text)
                .map_or(Value::Null, Value::String);
            record.insert(field.to_string(), value);
        }

        let address = selector(ADDRESS_BLOCK, url)?;
        if let Some(block) = html.select(&address).next() {
            if let Some(list) = block.next_siblings().find_map(ElementRef::wrap) {
                record.extend(parse_description_list(list, url)?);
            }
        }

        Ok(record)
    }
}

/// Pairs up `dt`/`dd` entries, skipping `dd`s that contain nested markup
fn parse_description_list(list: ElementRef<'_>, url: &str) -> Result<FlatRecord, HarvestError> {
    let dt = selector("dt", url)?;
    let dd = selector("dd", url)?;

    let mut fields = FlatRecord::new();
    for (term, definition) in list.select(&dt).zip(list.select(&dd)) {
        if definition.children().any(|c| c.value().is_element()) {
            continue;
        }
        let key = term
            .text()
            .collect::<String>()
            .replace(':', "")
            .trim()
            .to_string();
        if key.is_empty() {
            continue;
        }
        let value = element_text(definition).map_or(Value::Null, Value::String);
        fields.insert(key, value);
    }
    Ok(fields)
}

/// Trimmed text of an element, `None` when blank
fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<String>();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn selector(css: &str, url: &str) -> Result<Selector, HarvestError> {
    Selector::parse(css).map_err(|e| HarvestError::Extraction {
        url: url.to_string(),
        message: format!("invalid selector {}: {}", css, e),
    })
}
