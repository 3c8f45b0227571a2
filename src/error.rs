//! Error types for the icon resolver

use thiserror::Error;

/// Result type alias for resolver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading a page or resolving its icon
///
/// Most of these never leave the resolution pipeline: a candidate that fails
/// to fetch or decode is skipped and, in the worst case, the generated icon is
/// used. They surface to callers from page loading, client construction and
/// the lower-level building blocks (`decode`, `vector`, `fetch`).
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to build the HTTP client
    #[error("Resolver initialization failed: {0}")]
    InitializationError(String),

    /// A URL could not be parsed or resolved
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load the page that icons are discovered from
    #[error("Failed to load page: {0}")]
    LoadError(String),

    /// Candidate bytes could not be turned into a bitmap
    #[error("Decode failed: {0}")]
    DecodeError(String),

    /// Vector document could not be rendered
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Network error reported by a transport
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// All fetch attempts for a URL failed
    #[error(transparent)]
    Fetch(#[from] FetchFailure),
}

/// Terminal outcome of a fetch whose attempts were exhausted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} after {attempts} attempt(s)")]
pub struct FetchFailure {
    /// The failure observed on the last attempt
    pub kind: FetchFailureKind,
    /// How many requests were actually sent
    pub attempts: u32,
}

/// Why a single fetch attempt failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailureKind {
    /// Connection, TLS, timeout or body read failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Server answered with something other than 200
    #[error("server returned status code {0}")]
    Status(u16),

    /// The retry wait was cut short by a cancel token or deadline
    #[error("cancelled")]
    Cancelled,
}
