//! HTML helpers on top of `scraper`.

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

pub fn parse(content: &str) -> Html {
    log::debug!("Parsing HTML content ({} bytes)", content.len());
    Html::parse_document(content)
}

/// Trimmed, non-empty text nodes of `element` joined with `sep`.
pub fn joined_text(element: &ElementRef, sep: &str) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

/// First `application/ld+json` script of the document, if it parses.
pub fn extract_json_ld(doc: &Html) -> Option<Value> {
    let sel = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    let script = doc.select(&sel).next()?;
    let raw = script.text().collect::<String>();
    match serde_json::from_str(&raw) {
        Ok(v) => {
            log::debug!("Successfully extracted JSON-LD data");
            Some(v)
        }
        Err(e) => {
            log::warn!("Failed to parse JSON-LD: {e}");
            None
        }
    }
}

/// Cell texts of every `tr` under `table`; rows without cells are dropped.
pub fn extract_table(table: &ElementRef) -> Vec<Vec<String>> {
    let (Ok(tr), Ok(cell)) = (Selector::parse("tr"), Selector::parse("td, th")) else {
        return Vec::new();
    };
    let rows: Vec<Vec<String>> = table
        .select(&tr)
        .map(|row| {
            row.select(&cell)
                .map(|c| c.text().collect::<String>().trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|row| !row.is_empty())
        .collect();
    log::debug!("Extracted {} rows from table", rows.len());
    rows
}
