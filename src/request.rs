//! Framework-free view of the inbound request.
//!
//! The scope and FUP checkers evaluate against this snapshot instead of the
//! axum request so they stay pure and trivially testable. The middleware
//! builds one instance per request.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum_extra::extract::cookie::CookieJar;

/// Per-request facts consulted by checkers.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// HTTP method, original casing.
    pub method: String,
    /// URL path component.
    pub path: String,
    /// Full request URI (path and query) as received; target/exclude handler
    /// patterns match against this.
    pub uri: String,
    /// Best-effort client IP (`X-Forwarded-For` first, then the socket peer).
    pub client_ip: Option<String>,
    /// Request cookies by name.
    pub cookies: HashMap<String, String>,
}

impl RequestInfo {
    /// Snapshot the relevant parts of an axum request.
    pub fn from_request(request: &Request<Body>) -> Self {
        let cookies = CookieJar::from_headers(request.headers())
            .iter()
            .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
            .collect();
        Self {
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            uri: request.uri().to_string(),
            client_ip: extract_client_ip(request),
            cookies,
        }
    }

    /// Minimal constructor for tests and non-axum callers.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            method: method.into(),
            uri: path.clone(),
            path,
            client_ip: None,
            cookies: HashMap::new(),
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

/// Extract the client IP, preferring `X-Forwarded-For` for proxied requests.
fn extract_client_ip(request: &Request<Body>) -> Option<String> {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            // X-Forwarded-For can contain multiple IPs; the first is the original client
            return value.split(',').next().map(|s| s.trim().to_string());
        }
    }
    request.extensions().get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0.ip().to_string())
}
