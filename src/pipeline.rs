//! Icon resolution: discover candidates, try them in order, fall back to a
//! generated icon.
//!
//! Candidates are tried strictly one after another and the first one that
//! decodes wins; later candidates are never fetched. Resolution itself cannot
//! fail: when nothing decodes the icon is generated from the host name.

use crate::decode;
use crate::discovery;
use crate::fallback;
use crate::fetch::{CancelToken, Fetcher, HttpTransport, RetryPolicy, Transport};
use crate::page::{self, PageContext};
use crate::{ResolverConfig, Result};
use image::RgbaImage;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Marker reported when the icon was generated instead of downloaded.
pub const GENERATED_SOURCE: &str = "generated";

/// Where the final bitmap came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconSource {
    Candidate(String),
    Generated,
}

impl IconSource {
    pub fn as_str(&self) -> &str {
        match self {
            IconSource::Candidate(url) => url,
            IconSource::Generated => GENERATED_SOURCE,
        }
    }
}

impl fmt::Display for IconSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single result of a resolution.
#[derive(Debug, Clone)]
pub struct DecodedIcon {
    pub bitmap: RgbaImage,
    pub source: IconSource,
}

impl DecodedIcon {
    pub fn is_generated(&self) -> bool {
        self.source == IconSource::Generated
    }
}

/// Resolves icons for pages. Cheap to clone and safe to share between threads.
#[derive(Clone)]
pub struct Resolver {
    fetcher: Fetcher,
    config: Arc<ResolverConfig>,
}

impl Resolver {
    /// Build a resolver with the real HTTP transport.
    pub fn new(config: ResolverConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Build a resolver over any transport.
    pub fn with_transport(config: ResolverConfig, transport: Arc<dyn Transport>) -> Self {
        let policy = RetryPolicy {
            max_retries: config.max_retries,
            delay: Duration::from_millis(config.retry_delay_ms),
        };
        let fetcher = Fetcher::new(transport, config.user_agent.clone(), policy);
        Self {
            fetcher,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Fetch the page at `url` (single attempt).
    pub fn load_page(&self, url: &Url, cancel: &CancelToken) -> Result<PageContext> {
        page::load(&self.fetcher, url, cancel)
    }

    /// Resolve the icon for `page`, never failing.
    pub fn resolve(&self, page: &PageContext) -> DecodedIcon {
        self.resolve_with_cancel(page, &CancelToken::new())
    }

    /// Like [`resolve`](Self::resolve); once `cancel` fires the remaining
    /// candidates are skipped and the generated icon is returned.
    pub fn resolve_with_cancel(&self, page: &PageContext, cancel: &CancelToken) -> DecodedIcon {
        if let Some((url, bitmap)) = self.first_decodable(page, cancel) {
            log::info!("resolved icon for {} from {}", page.base_url, url);
            return DecodedIcon {
                bitmap,
                source: IconSource::Candidate(url),
            };
        }

        let host = page.hostname();
        log::info!("no usable icon for {}, generating one for {:?}", page.base_url, host);
        DecodedIcon {
            bitmap: fallback::generate(host),
            source: IconSource::Generated,
        }
    }

    /// Candidates for `page` in priority order.
    pub fn candidates(&self, page: &PageContext) -> Vec<String> {
        discovery::discover(&page.markup(), &page.base_url)
    }

    /// First candidate that decodes, with its bitmap.
    pub fn first_decodable(&self, page: &PageContext, cancel: &CancelToken) -> Option<(String, RgbaImage)> {
        let candidates = self.candidates(page);
        log::debug!("{} icon candidate(s) for {}", candidates.len(), page.base_url);

        for (i, candidate) in candidates.into_iter().enumerate() {
            if cancel.is_cancelled() {
                log::debug!("resolution for {} cancelled before candidate {}", page.base_url, i);
                return None;
            }
            match decode::decode(&candidate, &self.fetcher, cancel) {
                Ok(bitmap) => return Some((candidate, bitmap)),
                Err(e) => log::warn!("icon candidate {} unusable: {}", candidate, e),
            }
        }
        None
    }
}
