//! Candidate discovery: find icon links in page markup and make them absolute.
//!
//! Candidates come back in priority order. Every `<link>` whose `rel` mentions
//! an icon is listed in document order, followed by the conventional
//! `/favicon.ico` path. Duplicates are dropped by exact string equality,
//! keeping the first occurrence.

use scraper::{Html, Selector};
use std::collections::HashSet;
use url::{ParseError, Url};

/// Path tried after every markup-declared icon.
pub const CONVENTIONAL_FAVICON_PATH: &str = "/favicon.ico";

/// Resolve a candidate reference against the page URL.
///
/// Absolute references (including `data:` URLs) are returned as parsed.
/// Relative references follow RFC 3986 resolution against `base`. Returns
/// `None` for an empty candidate or one that is not a valid URL reference.
pub fn resolve(candidate: &str, base: &Url) -> Option<String> {
    if candidate.is_empty() {
        return None;
    }
    match Url::parse(candidate) {
        Ok(absolute) => Some(absolute.to_string()),
        Err(ParseError::RelativeUrlWithoutBase) => base.join(candidate).ok().map(|u| u.to_string()),
        Err(_) => None,
    }
}

/// Whether a `rel` attribute value marks an icon link.
///
/// Covers `icon`, `shortcut icon`, `apple-touch-icon`,
/// `apple-touch-icon-precomposed` and any other value containing "icon"
/// (`mask-icon`, `fluid-icon`, ...).
pub fn is_icon_rel(rel: &str) -> bool {
    rel.to_ascii_lowercase().contains("icon")
}

/// Scan `markup` for icon candidates, resolved against `base`.
///
/// The result is never empty: `/favicon.ico` resolved against `base` is
/// always appended.
pub fn discover(markup: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(markup);
    let mut hrefs: Vec<&str> = Vec::new();

    // The selector is a literal; parsing can only fail if the literal is wrong.
    if let Ok(link_sel) = Selector::parse("link[rel]") {
        for node in document.select(&link_sel) {
            let element = node.value();
            let is_icon = element.attr("rel").map(is_icon_rel).unwrap_or(false);
            if !is_icon {
                continue;
            }
            match element.attr("href") {
                Some(href) if !href.is_empty() => hrefs.push(href),
                _ => {}
            }
        }
    }
    hrefs.push(CONVENTIONAL_FAVICON_PATH);

    let resolved = hrefs.into_iter().filter_map(|href| {
        let abs = resolve(href, base);
        if abs.is_none() {
            log::debug!("dropping unresolvable icon reference {:?}", href);
        }
        abs
    });
    dedup_stable(resolved)
}

/// Drop repeated entries, keeping first-seen order.
fn dedup_stable<I: IntoIterator<Item = String>>(items: I) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if seen.insert(item.clone()) {
            out.push(item);
        }
    }
    out
}
