//! Link extraction: index HTML → ordered manifest entries.
//!
//! Links are taken in document order. Each keeps the text of its anchor as
//! its title, its `href` resolved against the base URL, and its list depth
//! (`ul`/`ol` ancestors) so the merged outline can mirror the index's
//! nesting.

use crate::config::ExtractConfig;
use crate::error::PageBindError;
use crate::manifest::{assign_file_names, ManifestEntry};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, trace};
use url::Url;

/// Parse and validate the URL relative links are resolved against.
pub fn parse_base_url(base_url: &str) -> Result<Url, PageBindError> {
    let url = Url::parse(base_url.trim()).map_err(|e| PageBindError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(PageBindError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: "URL cannot be used as a base".to_string(),
        });
    }
    Ok(url)
}

/// Extract every usable link from `html`.
///
/// Returned entries have absolute URLs and unique file names. Nothing is
/// written to disk.
pub fn extract_links(
    html: &str,
    base_url: &str,
    config: &ExtractConfig,
) -> Result<Vec<ManifestEntry>, PageBindError> {
    let base = parse_base_url(base_url)?;
    let selector = Selector::parse(&config.link_selector).map_err(|e| PageBindError::Parse {
        what: format!("link selector '{}'", config.link_selector),
        detail: e.to_string(),
    })?;

    let document = Html::parse_document(html);
    let mut seen: HashSet<String> = HashSet::new();
    let mut found: Vec<(ManifestEntry, usize)> = Vec::new();

    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(title) = link_title(&anchor) else {
            trace!("skipping untitled link {}", href);
            continue;
        };
        let Some(url) = resolve_href(&base, href) else {
            trace!("skipping non-page link {}", href);
            continue;
        };
        if config.dedupe && !seen.insert(url.to_string()) {
            trace!("skipping duplicate link {}", url);
            continue;
        }
        found.push((ManifestEntry::new(url.to_string(), title), list_depth(&anchor)));
    }

    let min_depth = found.iter().map(|(_, d)| *d).min().unwrap_or(0);
    let mut entries: Vec<ManifestEntry> = found
        .into_iter()
        .map(|(entry, depth)| {
            let level = if config.nested { depth - min_depth } else { 0 };
            entry.with_level(level)
        })
        .collect();
    assign_file_names(&mut entries);

    debug!("Extracted {} links (base {})", entries.len(), base);
    Ok(entries)
}

/// Anchor text with whitespace collapsed, else the `title` attribute.
fn link_title(anchor: &ElementRef<'_>) -> Option<String> {
    let text = collapse_whitespace(&anchor.text().collect::<String>());
    if !text.is_empty() {
        return Some(text);
    }
    anchor
        .value()
        .attr("title")
        .map(collapse_whitespace)
        .filter(|t| !t.is_empty())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Absolute http(s) URL for `href`, or `None` for links that are not pages
/// (other schemes, same-page fragments, unparsable hrefs).
fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    if url.fragment().is_some() && same_document(&url, base) {
        return None;
    }
    Some(url)
}

fn same_document(a: &Url, b: &Url) -> bool {
    let mut a = a.clone();
    let mut b = b.clone();
    a.set_fragment(None);
    b.set_fragment(None);
    a == b
}

/// Number of `ul`/`ol` elements enclosing the anchor.
fn list_depth(anchor: &ElementRef<'_>) -> usize {
    anchor
        .ancestors()
        .filter_map(|node| node.value().as_element())
        .filter(|el| matches!(el.name(), "ul" | "ol"))
        .count()
}
