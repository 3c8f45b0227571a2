//! JSON HTTP API.
//!
//! A fixed pool of worker threads pulls requests off one shared `tiny_http`
//! listener. Each request is handled start to finish on its worker with
//! blocking I/O; workers share nothing mutable, only the `Resolver` (and its
//! HTTP client) behind an `Arc`.
//!
//! Routes:
//! - `POST /api/favicon` with `{"url": "..."}`: page metadata, the chosen
//!   icon source and PNG renditions at every configured size.
//! - `GET /api?=<url>` (or `?url=<url>`): page metadata and the first icon
//!   candidate that decodes, without rendering.

use crate::fetch::CancelToken;
use crate::page::{self, PageContext};
use crate::{output, Error, Resolver, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, Server};

/// Server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address
    pub addr: String,
    /// Number of worker threads
    pub workers: usize,
    /// Reported by `GET /api` when no candidate decodes
    pub fallback_icon_url: String,
    /// Budget for one request; retry waits and remaining candidates are cut
    /// once it runs out
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:3000".to_string(),
            workers: num_cpus::get(),
            fallback_icon_url: "http://127.0.0.1:3000/static/favicon.svg".to_string(),
            request_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FaviconRequest {
    #[serde(default)]
    url: String,
}

/// Body of `POST /api/favicon`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaviconResponse {
    pub title: String,
    pub description: String,
    pub url: String,
    pub favicon_url: String,
    /// Size in pixels -> PNG data URL
    pub favicons: BTreeMap<String, String>,
}

/// Body of `GET /api`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub title: String,
    pub description: String,
    pub url: String,
    pub favicon_url: String,
}

/// Status and JSON body produced by a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiReply {
    pub status: u16,
    pub body: String,
}

impl ApiReply {
    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self { status, body },
            Err(e) => Self::error(500, &format!("Failed to serialize response: {}", e)),
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": message }).to_string(),
        }
    }

    fn empty(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }
}

/// Dispatch one request. `target` is the request-target (path and query).
pub fn route(resolver: &Resolver, config: &ServerConfig, method: &Method, target: &str, body: &str) -> ApiReply {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    match (method, path) {
        (Method::Options, _) => ApiReply::empty(204),
        (Method::Post, "/api/favicon") => favicon(resolver, config, body),
        (Method::Get, "/api") => lookup(resolver, config, query),
        _ => ApiReply::error(404, "Not Found"),
    }
}

fn favicon(resolver: &Resolver, config: &ServerConfig, body: &str) -> ApiReply {
    let requested = match serde_json::from_str::<FaviconRequest>(body) {
        Ok(req) if !req.url.trim().is_empty() => req.url,
        _ => return ApiReply::error(400, "URL is required"),
    };
    let cancel = request_token(config);
    let (page, target) = match load(resolver, &requested, &cancel) {
        Ok(loaded) => loaded,
        Err(reply) => return reply,
    };

    let meta = page::extract_metadata(&page);
    let icon = resolver.resolve_with_cancel(&page, &cancel);
    let favicons = output::render_sizes(&icon.bitmap, &resolver.config().output_sizes);

    ApiReply::json(
        200,
        &FaviconResponse {
            title: meta.title,
            description: meta.description,
            url: target,
            favicon_url: icon.source.to_string(),
            favicons,
        },
    )
}

fn lookup(resolver: &Resolver, config: &ServerConfig, query: &str) -> ApiReply {
    let requested = url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, value)| (key.is_empty() || key == "url") && !value.is_empty())
        .map(|(_, value)| value.into_owned());
    let requested = match requested {
        Some(u) => u,
        None => return ApiReply::error(400, "URL parameter is required"),
    };
    let cancel = request_token(config);
    let (page, target) = match load(resolver, &requested, &cancel) {
        Ok(loaded) => loaded,
        Err(reply) => return reply,
    };

    let meta = page::extract_metadata(&page);
    let favicon_url = resolver
        .first_decodable(&page, &cancel)
        .map(|(url, _)| url)
        .unwrap_or_else(|| config.fallback_icon_url.clone());

    ApiReply::json(
        200,
        &ApiResponse {
            title: meta.title,
            description: meta.description,
            url: target,
            favicon_url,
        },
    )
}

fn request_token(config: &ServerConfig) -> CancelToken {
    CancelToken::with_timeout(Duration::from_millis(config.request_timeout_ms))
}

fn load(resolver: &Resolver, requested: &str, cancel: &CancelToken) -> std::result::Result<(PageContext, String), ApiReply> {
    let target = page::normalize_target(requested).map_err(|_| ApiReply::error(400, "Invalid URL"))?;
    let page = resolver.load_page(&target, cancel).map_err(|e| match e {
        Error::LoadError(msg) => ApiReply::error(500, &msg),
        other => ApiReply::error(500, &other.to_string()),
    })?;
    Ok((page, target.to_string()))
}

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

fn cors_headers() -> Vec<Header> {
    [
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Methods", "GET, POST"),
        ("Access-Control-Allow-Headers", "Origin, Content-Type"),
        ("Access-Control-Expose-Headers", "Content-Length"),
    ]
    .iter()
    .filter_map(|(n, v)| header(n, v))
    .collect()
}

/// Largest request body accepted, in bytes.
pub const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Read at most [`MAX_BODY_BYTES`] of a request body. Longer bodies are
/// answered with 413 without reading the rest.
fn read_body<R: Read>(reader: R) -> std::result::Result<String, ApiReply> {
    let mut body = String::new();
    match reader.take(MAX_BODY_BYTES + 1).read_to_string(&mut body) {
        Ok(n) if n as u64 > MAX_BODY_BYTES => Err(ApiReply::error(413, "Request body too large")),
        Ok(_) => Ok(body),
        Err(e) => {
            log::warn!("failed to read request body: {}", e);
            Err(ApiReply::error(400, "Failed to read request body"))
        }
    }
}

/// Run a handler, turning a panic into a 500 so the worker survives.
fn guarded(handler: impl FnOnce() -> ApiReply) -> ApiReply {
    panic::catch_unwind(AssertUnwindSafe(handler)).unwrap_or_else(|_| {
        log::error!("request handler panicked");
        ApiReply::error(500, "Internal server error")
    })
}

fn handle_request(resolver: &Resolver, config: &ServerConfig, mut request: Request) {
    let reply = match read_body(request.as_reader()) {
        Ok(body) => guarded(|| route(resolver, config, request.method(), request.url(), &body)),
        Err(reply) => reply,
    };
    log::info!("{} {} -> {}", request.method(), request.url(), reply.status);

    let mut response = Response::from_string(reply.body).with_status_code(reply.status);
    if let Some(h) = header("Content-Type", "application/json; charset=utf-8") {
        response.add_header(h);
    }
    for h in cors_headers() {
        response.add_header(h);
    }
    if let Err(e) = request.respond(response) {
        log::warn!("failed to send response: {}", e);
    }
}

/// Bound listener plus everything the workers need.
pub struct IconServer {
    server: Arc<Server>,
    resolver: Resolver,
    config: ServerConfig,
}

impl IconServer {
    pub fn bind(resolver: Resolver, config: ServerConfig) -> Result<Self> {
        let server = Server::http(&config.addr)
            .map_err(|e| Error::InitializationError(format!("Failed to bind {}: {}", config.addr, e)))?;
        Ok(Self {
            server: Arc::new(server),
            resolver,
            config,
        })
    }

    /// Base URL of the listener, e.g. `http://127.0.0.1:3000`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.server.server_addr())
    }

    /// Serve until the listener shuts down. Blocks the calling thread.
    pub fn run(self) -> Result<()> {
        let workers = self.config.workers.max(1);
        log::info!("listening on {} with {} worker(s)", self.base_url(), workers);

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let server = Arc::clone(&self.server);
            let resolver = self.resolver.clone();
            let config = self.config.clone();
            handles.push(thread::spawn(move || {
                while let Ok(request) = server.recv() {
                    handle_request(&resolver, &config, request);
                }
            }));
        }
        for handle in handles {
            if handle.join().is_err() {
                log::warn!("server worker panicked");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::fixtures::png;
    use crate::fetch::mock::ScriptedTransport;
    use crate::ResolverConfig;

    const PAGE: &str = r#"<html><head><title>Example</title>
        <meta name="description" content="An example site">
        <link rel="icon" href="/icon.png"></head></html>"#;

    fn resolver(transport: ScriptedTransport) -> Resolver {
        let config = ResolverConfig {
            retry_delay_ms: 1,
            ..ResolverConfig::default()
        };
        Resolver::with_transport(config, Arc::new(transport))
    }

    fn config() -> ServerConfig {
        ServerConfig {
            workers: 1,
            ..ServerConfig::default()
        }
    }

    fn site() -> ScriptedTransport {
        ScriptedTransport::new().reply("https://example.com/", 200, Some("text/html"), PAGE.as_bytes().to_vec())
    }

    #[test]
    fn post_favicon_renders_all_sizes() {
        let r = resolver(site().reply("https://example.com/icon.png", 200, Some("image/png"), png(64, 64)));
        let reply = route(&r, &config(), &Method::Post, "/api/favicon", r#"{"url":"example.com"}"#);
        assert_eq!(reply.status, 200);

        let v: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(v["title"], "Example");
        assert_eq!(v["description"], "An example site");
        assert_eq!(v["url"], "https://example.com/");
        assert_eq!(v["faviconUrl"], "https://example.com/icon.png");
        let favicons = v["favicons"].as_object().unwrap();
        for size in ["16", "32", "64", "128", "256"] {
            assert!(favicons[size].as_str().unwrap().starts_with("data:image/png;base64,"));
        }
    }

    #[test]
    fn post_favicon_falls_back_to_generated() {
        let r = resolver(site());
        let reply = route(&r, &config(), &Method::Post, "/api/favicon", r#"{"url":"https://example.com"}"#);
        let v: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(v["faviconUrl"], "generated");
        assert_eq!(v["favicons"].as_object().unwrap().len(), 5);
    }

    #[test]
    fn post_without_url_is_bad_request() {
        let r = resolver(ScriptedTransport::new());
        for body in ["", "{}", r#"{"url":""}"#, "not json"] {
            let reply = route(&r, &config(), &Method::Post, "/api/favicon", body);
            assert_eq!(reply.status, 400, "body {:?}", body);
            assert!(reply.body.contains("URL is required"));
        }
    }

    #[test]
    fn unreachable_page_is_server_error() {
        let r = resolver(ScriptedTransport::new().reply("https://down.example/", 502, None, vec![]));
        let reply = route(&r, &config(), &Method::Post, "/api/favicon", r#"{"url":"down.example"}"#);
        assert_eq!(reply.status, 500);
        assert!(reply.body.contains("502"));
    }

    #[test]
    fn get_api_reports_first_decodable_candidate() {
        let r = resolver(site().reply("https://example.com/icon.png", 200, Some("image/png"), png(8, 8)));
        let reply = route(&r, &config(), &Method::Get, "/api?=example.com", "");
        let v: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(v["faviconUrl"], "https://example.com/icon.png");
        assert!(v.get("favicons").is_none());

        let by_name = route(&r, &config(), &Method::Get, "/api?url=https%3A%2F%2Fexample.com", "");
        assert_eq!(by_name.status, 200);
    }

    #[test]
    fn get_api_uses_configured_fallback_url() {
        let r = resolver(site());
        let reply = route(&r, &config(), &Method::Get, "/api?=example.com", "");
        let v: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(v["faviconUrl"], config().fallback_icon_url);
    }

    #[test]
    fn get_api_requires_parameter() {
        let r = resolver(ScriptedTransport::new());
        assert_eq!(route(&r, &config(), &Method::Get, "/api", "").status, 400);
        assert_eq!(route(&r, &config(), &Method::Get, "/api?=", "").status, 400);
    }

    #[test]
    fn unknown_routes_and_preflight() {
        let r = resolver(ScriptedTransport::new());
        assert_eq!(route(&r, &config(), &Method::Get, "/nope", "").status, 404);
        assert_eq!(route(&r, &config(), &Method::Options, "/api/favicon", "").status, 204);
    }

    #[test]
    fn oversized_body_is_refused() {
        let big = vec![b'a'; MAX_BODY_BYTES as usize + 1];
        let reply = read_body(std::io::Cursor::new(big)).unwrap_err();
        assert_eq!(reply.status, 413);

        let exact = vec![b'a'; MAX_BODY_BYTES as usize];
        assert_eq!(read_body(std::io::Cursor::new(exact)).unwrap().len(), MAX_BODY_BYTES as usize);
    }

    #[test]
    fn body_that_is_not_utf8_is_bad_request() {
        let reply = read_body(&[0xff, 0xfe, 0x00][..]).unwrap_err();
        assert_eq!(reply.status, 400);
    }

    #[test]
    fn panicking_handler_becomes_server_error() {
        let reply = guarded(|| panic!("handler blew up"));
        assert_eq!(reply.status, 500);
        assert!(reply.body.contains("Internal server error"));

        let ok = guarded(|| ApiReply::empty(204));
        assert_eq!(ok.status, 204);
    }

    #[test]
    fn cors_headers_are_well_formed() {
        assert_eq!(cors_headers().len(), 4);
    }
}
