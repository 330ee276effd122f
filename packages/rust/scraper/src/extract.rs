//! Bill text extraction from the upstream bill text page.
//!
//! The upstream site renders a bill's full text inside `<pre class="aaaCtype">`.

use std::sync::LazyLock;

use scraper::{Html, Selector};

use billtracker_shared::{FULL_TEXT_FETCH_FAILED, FULL_TEXT_NOT_AVAILABLE, Result};

/// Container holding the bill text on the upstream page.
static BILL_TEXT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("pre.aaaCtype").expect("bill text selector"));

/// Extract the trimmed bill text, or [`FULL_TEXT_NOT_AVAILABLE`] when the page has none.
pub fn extract_full_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    doc.select(&BILL_TEXT_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_else(|| FULL_TEXT_NOT_AVAILABLE.to_string())
}

/// Map a fetch outcome to full text, using [`FULL_TEXT_FETCH_FAILED`] for failures.
pub fn full_text_or_sentinel(fetched: Result<String>) -> String {
    match fetched {
        Ok(html) => extract_full_text(&html),
        Err(_) => FULL_TEXT_FETCH_FAILED.to_string(),
    }
}

/// Reduce an HTML fragment to its text content.
pub fn strip_html(fragment: &str) -> String {
    Html::parse_fragment(fragment)
        .root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_string()
}
