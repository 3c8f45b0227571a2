//! HTTP fetching with a fixed retry policy.
//!
//! Requests go through the [`Transport`] trait so the retry loop can be
//! exercised without a network. [`HttpTransport`] is the production
//! implementation backed by a shared blocking `reqwest` client that is built
//! once from [`ResolverConfig`] and never mutated afterwards.

use crate::error::{FetchFailure, FetchFailureKind};
use crate::{Error, ResolverConfig, Result};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Environment variables consulted for an outbound proxy, most preferred first.
pub const PROXY_ENV_VARS: [&str; 2] = ["HTTPS_PROXY", "HTTP_PROXY"];

/// A response as seen by the fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Raw `Content-Type` header, if any
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// A single GET request. Implementations must be safe to share between
/// concurrently running resolutions.
pub trait Transport: Send + Sync {
    /// Perform one GET with the given `User-Agent`. Any HTTP status is an
    /// `Ok`; only transport-level failures are errors.
    fn get(&self, url: &str, user_agent: &str) -> Result<HttpResponse>;
}

/// Pick the proxy URL from environment-style variables.
///
/// `HTTPS_PROXY` wins over `HTTP_PROXY`; empty values are ignored.
pub fn select_proxy<F>(lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    PROXY_ENV_VARS
        .iter()
        .filter_map(|name| lookup(name))
        .find(|value| !value.trim().is_empty())
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms));

        builder = match config.proxy.as_deref() {
            Some(proxy) => {
                let proxy = reqwest::Proxy::all(proxy)
                    .map_err(|e| Error::ConfigError(format!("Invalid proxy {}: {}", proxy, e)))?;
                builder.proxy(proxy)
            }
            // Proxy selection is explicit; keep reqwest from reading the env itself.
            None => builder.no_proxy(),
        };

        let client = builder.build().map_err(|e| {
            Error::InitializationError(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, user_agent: &str) -> Result<HttpResponse> {
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .send()
            .map_err(|e| Error::NetworkError(format!("GET {} failed: {}", url, e)))?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Error bodies are never inspected.
        let body = if status == 200 {
            resp.bytes()
                .map_err(|e| Error::NetworkError(format!("Failed to read body of {}: {}", url, e)))?
                .to_vec()
        } else {
            Vec::new()
        };

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Fixed-delay retry policy: `max_retries + 1` attempts in total, no backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(1),
        }
    }
}

/// Body and content type of a successful (HTTP 200) fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub attempts: u32,
}

pub type FetchOutcome = std::result::Result<Fetched, FetchFailure>;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: Mutex<bool>,
    signal: Condvar,
    deadline: Option<Instant>,
}

/// Cooperative cancellation for retry waits.
///
/// Cloning shares the same state. A token fires either when [`cancel`] is
/// called or when its deadline passes.
///
/// [`cancel`]: CancelToken::cancel
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

impl CancelToken {
    /// A token that only fires on an explicit `cancel()`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            inner: Arc::new(CancelState {
                deadline: Some(deadline),
                ..CancelState::default()
            }),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        let mut cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.inner.signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let flagged = *self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        flagged || self.deadline_passed(Instant::now())
    }

    fn deadline_passed(&self, now: Instant) -> bool {
        self.inner.deadline.map(|d| now >= d).unwrap_or(false)
    }

    /// Sleep for `duration` unless the token fires first.
    ///
    /// Returns `true` when the wait was cut short.
    pub fn wait(&self, duration: Duration) -> bool {
        let mut end = Instant::now() + duration;
        if let Some(deadline) = self.inner.deadline {
            end = end.min(deadline);
        }

        let mut cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if *cancelled {
                return true;
            }
            let now = Instant::now();
            if now >= end {
                return self.deadline_passed(now);
            }
            let (guard, _) = self
                .inner
                .signal
                .wait_timeout(cancelled, end - now)
                .unwrap_or_else(PoisonError::into_inner);
            cancelled = guard;
        }
    }
}

/// Performs GETs with the identity header and the configured retry policy.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    user_agent: String,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, user_agent: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            user_agent: user_agent.into(),
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetch with the fetcher's own retry policy.
    pub fn fetch(&self, url: &str, cancel: &CancelToken) -> FetchOutcome {
        self.fetch_with_policy(url, self.policy, cancel)
    }

    /// Fetch `url`, retrying transport errors and non-200 statuses.
    ///
    /// Waits `policy.delay` between attempts (never after the last one). On
    /// exhaustion the failure of the last attempt is returned. A token that
    /// is already cancelled prevents any request from being sent.
    pub fn fetch_with_policy(&self, url: &str, policy: RetryPolicy, cancel: &CancelToken) -> FetchOutcome {
        if cancel.is_cancelled() {
            return Err(FetchFailure {
                kind: FetchFailureKind::Cancelled,
                attempts: 0,
            });
        }

        let total = policy.total_attempts();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let kind = match self.transport.get(url, &self.user_agent) {
                Ok(resp) if resp.status == 200 => {
                    return Ok(Fetched {
                        body: resp.body,
                        content_type: resp.content_type,
                        attempts,
                    });
                }
                Ok(resp) => FetchFailureKind::Status(resp.status),
                Err(e) => FetchFailureKind::Transport(e.to_string()),
            };

            if attempts >= total {
                return Err(FetchFailure { kind, attempts });
            }

            log::warn!(
                "request to {} failed (attempt {}/{}): {}; retrying in {:?}",
                url,
                attempts,
                total,
                kind,
                policy.delay
            );
            if cancel.wait(policy.delay) {
                log::debug!("retry wait for {} cancelled", url);
                return Err(FetchFailure { kind, attempts });
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};

    type Reply = std::result::Result<HttpResponse, String>;

    /// In-memory transport answering from per-URL scripts.
    ///
    /// Each URL has a queue of replies; the last one repeats forever. Unknown
    /// URLs answer 404.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        routes: Mutex<HashMap<String, VecDeque<Reply>>>,
        hits: Mutex<HashMap<String, u32>>,
        agents: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn reply(self, url: &str, status: u16, content_type: Option<&str>, body: Vec<u8>) -> Self {
            self.push(
                url,
                Ok(HttpResponse {
                    status,
                    content_type: content_type.map(str::to_string),
                    body,
                }),
            )
        }

        pub(crate) fn fail(self, url: &str, message: &str) -> Self {
            self.push(url, Err(message.to_string()))
        }

        fn push(self, url: &str, reply: Reply) -> Self {
            self.routes
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(reply);
            self
        }

        pub(crate) fn hits(&self, url: &str) -> u32 {
            self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
        }

        pub(crate) fn agents(&self) -> Vec<String> {
            self.agents.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn get(&self, url: &str, user_agent: &str) -> Result<HttpResponse> {
            *self.hits.lock().unwrap().entry(url.to_string()).or_default() += 1;
            self.agents.lock().unwrap().push(user_agent.to_string());

            let mut routes = self.routes.lock().unwrap();
            let reply = match routes.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            };
            match reply {
                Some(Ok(resp)) => Ok(resp),
                Some(Err(msg)) => Err(Error::NetworkError(msg)),
                None => Ok(HttpResponse {
                    status: 404,
                    content_type: Some("text/html".to_string()),
                    body: b"Not Found".to_vec(),
                }),
            }
        }
    }
}
