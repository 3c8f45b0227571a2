//! Favicon Resolver
//!
//! Finds the best available icon for a website. Given a page, it discovers
//! candidate icon URLs, fetches and decodes them (PNG, JPEG, ICO, SVG and
//! inline `data:` URLs) and, if none of them work, generates a deterministic
//! icon from the domain name. The result can then be rendered at a fixed set
//! of sizes.
//!
//! # Example
//!
//! ```no_run
//! use favicon_resolver::{page, Resolver, ResolverConfig};
//! use favicon_resolver::fetch::CancelToken;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = Resolver::new(ResolverConfig::from_env())?;
//! let url = page::normalize_target("example.com")?;
//! let page = resolver.load_page(&url, &CancelToken::new())?;
//! let icon = resolver.resolve(&page);
//! println!("{} ({}x{})", icon.source, icon.bitmap.width(), icon.bitmap.height());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub use error::{Error, FetchFailure, FetchFailureKind, Result};

pub mod decode;
pub mod discovery;
pub mod fallback;
pub mod fetch;
pub mod output;
pub mod page;
pub mod pipeline;
pub mod vector;

// JSON API over tiny_http
#[cfg(feature = "server")]
pub mod server;

pub use page::{PageContext, PageMetadata};
pub use pipeline::{DecodedIcon, IconSource, Resolver, GENERATED_SOURCE};

/// Browser identity sent with every request. Many sites refuse requests with
/// an empty or library-default agent.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Configuration for a [`Resolver`]
///
/// The defaults mirror a browser fetching a page: a fixed Chrome user agent,
/// a 10 second per-request timeout and two retries one second apart. The
/// value is frozen once a `Resolver` is built from it.
///
/// # Examples
///
/// ```
/// let cfg = favicon_resolver::ResolverConfig::default();
/// assert_eq!(cfg.max_retries, 2);
/// assert!(cfg.user_agent.contains("Chrome"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// User agent string sent with every request
    pub user_agent: String,
    /// Timeout for each individual request in milliseconds
    pub timeout_ms: u64,
    /// Connection establishment timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Retries after the first failed attempt of an icon fetch
    pub max_retries: u32,
    /// Fixed delay between attempts in milliseconds
    pub retry_delay_ms: u64,
    /// Proxy used for all outbound requests
    pub proxy: Option<String>,
    /// Pixel sizes of the rendered output
    pub output_sizes: Vec<u32>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
            max_retries: 2,
            retry_delay_ms: 1_000,
            proxy: None,
            output_sizes: output::DEFAULT_SIZES.to_vec(),
        }
    }
}

impl ResolverConfig {
    /// Defaults plus the proxy from `HTTPS_PROXY` / `HTTP_PROXY`.
    pub fn from_env() -> Self {
        Self {
            proxy: fetch::select_proxy(|name| std::env::var(name).ok()),
            ..Self::default()
        }
    }
}
