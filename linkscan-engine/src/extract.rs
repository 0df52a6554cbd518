//! Outbound-reference extraction from fetched HTML.

use scraper::{Html, Selector};

/// Tag/attribute pairs that yield candidate links.
const LINK_SOURCES: &[(&str, &str)] = &[("a[href]", "href"), ("img[src]", "src"), ("link[href]", "href")];

/// Scans markup for outbound references and returns the raw, unresolved
/// attribute values in document order. The parser is lenient: malformed
/// markup yields partial results rather than an error.
pub fn extract_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    for (selector, attr) in LINK_SOURCES {
        let selector = Selector::parse(selector).unwrap();
        for element in document.select(&selector) {
            if let Some(value) = element.value().attr(attr) {
                links.push(value.to_string());
            }
        }
    }

    links
}
