//! Smoke test for the JSON API over a real socket.
#![cfg(feature = "server")]

use favicon_resolver::server::{IconServer, ServerConfig};
use favicon_resolver::{Resolver, ResolverConfig};
use std::io::{Read, Write};
use std::net::TcpStream;
use tiny_http::{Response, Server};

fn start_site() -> String {
    let server = Server::http("127.0.0.1:0").unwrap();
    let base = format!("http://{}", server.server_addr());
    std::thread::spawn(move || {
        for request in server.incoming_requests() {
            let response = if request.url() == "/" {
                Response::from_string("<html><head><title>Smoke</title></head><body></body></html>")
            } else {
                Response::from_string("Not Found").with_status_code(404)
            };
            let _ = request.respond(response);
        }
    });
    base
}

fn start_api() -> String {
    let config = ResolverConfig {
        retry_delay_ms: 1,
        ..ResolverConfig::default()
    };
    let resolver = Resolver::new(config).expect("resolver");
    let server = IconServer::bind(
        resolver,
        ServerConfig {
            addr: "127.0.0.1:0".to_string(),
            workers: 2,
            ..ServerConfig::default()
        },
    )
    .expect("bind");
    let base = server.base_url();
    std::thread::spawn(move || server.run());
    base
}

/// Minimal HTTP/1.0 exchange; returns the raw response.
fn send(api: &str, raw_request: &str) -> String {
    let addr = api.trim_start_matches("http://");
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream.write_all(raw_request.as_bytes()).unwrap();
    let mut out = String::new();
    stream.read_to_string(&mut out).unwrap();
    out
}

#[test]
fn test_post_favicon_over_http() {
    let site = start_site();
    let api = start_api();

    let body = format!(r#"{{"url":"{}"}}"#, site);
    let request = format!(
        "POST /api/favicon HTTP/1.0\r\nHost: test\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let response = send(&api, &request);

    assert!(response.starts_with("HTTP/1.0 200") || response.starts_with("HTTP/1.1 200"), "{}", response);
    assert!(response.contains("Access-Control-Allow-Origin: *"));
    assert!(response.contains(r#""title":"Smoke""#));
    assert!(response.contains(r#""faviconUrl":"generated""#));
    assert!(response.contains(r#""256":"data:image/png;base64,"#));
}

#[test]
fn test_get_api_requires_url() {
    let api = start_api();
    let response = send(&api, "GET /api HTTP/1.0\r\nHost: test\r\n\r\n");
    assert!(response.contains(" 400 "), "{}", response);
    assert!(response.contains("URL parameter is required"));
}
