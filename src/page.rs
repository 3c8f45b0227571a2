//! The page icons are discovered from, and the metadata read from it.

use crate::fetch::{CancelToken, Fetcher, RetryPolicy};
use crate::{Error, Result};
use scraper::{Html, Selector};
use serde::Serialize;
use url::Url;

/// A fetched page: where it came from and its raw markup.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub base_url: Url,
    pub raw_markup: Vec<u8>,
}

impl PageContext {
    pub fn new(base_url: Url, raw_markup: impl Into<Vec<u8>>) -> Self {
        Self {
            base_url,
            raw_markup: raw_markup.into(),
        }
    }

    /// Markup as text; invalid UTF-8 is replaced.
    pub fn markup(&self) -> String {
        String::from_utf8_lossy(&self.raw_markup).into_owned()
    }

    /// Host name without port, empty for host-less URLs.
    pub fn hostname(&self) -> &str {
        self.base_url.host_str().unwrap_or("")
    }
}

/// Title and description shown alongside the icon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageMetadata {
    pub title: String,
    pub description: String,
}

/// Turn user input into an absolute URL, defaulting to `https://`.
pub fn normalize_target(input: &str) -> Result<Url> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::InvalidUrl("URL is required".into()));
    }
    let lower = input.to_ascii_lowercase();
    let target = if lower.starts_with("http://") || lower.starts_with("https://") {
        input.to_string()
    } else {
        format!("https://{}", input)
    };
    Url::parse(&target).map_err(|e| Error::InvalidUrl(format!("{}: {}", target, e)))
}

/// Fetch a page once (no retries) with the fetcher's identity header.
pub fn load(fetcher: &Fetcher, url: &Url, cancel: &CancelToken) -> Result<PageContext> {
    let fetched = fetcher
        .fetch_with_policy(url.as_str(), RetryPolicy::none(), cancel)
        .map_err(|failure| Error::LoadError(format!("Failed to fetch website {}: {}", url, failure)))?;
    Ok(PageContext::new(url.clone(), fetched.body))
}

/// Read `<title>` and `<meta name="description">` from the page.
///
/// An empty title falls back to the host name. With several description
/// tags the last one wins.
pub fn extract_metadata(page: &PageContext) -> PageMetadata {
    let document = Html::parse_document(&page.markup());

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next().map(|n| n.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| page.hostname().to_string());

    let mut description = String::new();
    if let Ok(meta_sel) = Selector::parse("meta[name]") {
        for node in document.select(&meta_sel) {
            let el = node.value();
            let is_description = el
                .attr("name")
                .map(|n| n.eq_ignore_ascii_case("description"))
                .unwrap_or(false);
            if let (true, Some(content)) = (is_description, el.attr("content")) {
                description = content.to_string();
            }
        }
    }

    PageMetadata { title, description }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::ScriptedTransport;
    use std::sync::Arc;

    fn page(html: &str) -> PageContext {
        PageContext::new(Url::parse("https://news.example.com:8443/a").unwrap(), html)
    }

    #[test]
    fn normalize_adds_https() {
        assert_eq!(normalize_target("example.com").unwrap().as_str(), "https://example.com/");
        assert_eq!(
            normalize_target("http://example.com/x").unwrap().as_str(),
            "http://example.com/x"
        );
        assert_eq!(normalize_target("HTTPS://Example.com").unwrap().host_str(), Some("example.com"));
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert!(matches!(normalize_target(""), Err(Error::InvalidUrl(_))));
        assert!(matches!(normalize_target("http://[bad"), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn metadata_reads_title_and_last_description() {
        let meta = extract_metadata(&page(
            r#"<html><head><title>News</title>
            <meta name="description" content="first">
            <meta name="Description" content="second">
            <meta name="keywords" content="k"></head></html>"#,
        ));
        assert_eq!(meta.title, "News");
        assert_eq!(meta.description, "second");
    }

    #[test]
    fn metadata_title_falls_back_to_hostname() {
        let meta = extract_metadata(&page("<html><body>hi</body></html>"));
        assert_eq!(meta.title, "news.example.com");
        assert_eq!(meta.description, "");
    }

    #[test]
    fn load_fails_on_non_200_without_retrying() {
        let url = Url::parse("https://example.com/").unwrap();
        let transport = Arc::new(ScriptedTransport::new().reply(url.as_str(), 503, None, vec![]));
        let fetcher = Fetcher::new(transport.clone(), "UA", Default::default());
        let err = load(&fetcher, &url, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, Error::LoadError(ref m) if m.contains("503")));
        assert_eq!(transport.hits(url.as_str()), 1);
    }

    #[test]
    fn load_keeps_markup_and_base() {
        let url = Url::parse("https://example.com/").unwrap();
        let transport = Arc::new(ScriptedTransport::new().reply(
            url.as_str(),
            200,
            Some("text/html"),
            b"<title>x</title>".to_vec(),
        ));
        let fetcher = Fetcher::new(transport, "UA", Default::default());
        let ctx = load(&fetcher, &url, &CancelToken::new()).unwrap();
        assert_eq!(ctx.base_url, url);
        assert_eq!(ctx.markup(), "<title>x</title>");
    }
}
