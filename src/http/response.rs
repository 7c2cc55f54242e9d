//! Response handling and transformation.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers before a response is cached or returned
//! - Tag responses with the cache outcome and key
//! - Map upstream failures to `502 Bad Gateway`

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Response, StatusCode};

/// Cache outcome header.
pub static X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Cache key header.
pub static X_CACHE_KEY: HeaderName = HeaderName::from_static("x-cache-key");

/// Headers that describe a single connection and are never forwarded.
pub const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::PROXY_AUTHORIZATION,
    header::PROXY_AUTHENTICATE,
    header::UPGRADE,
];

/// How a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Error,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Error => "ERROR",
        }
    }
}

/// Remove hop-by-hop headers in place.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Set `X-Cache` and, when the key is a valid header value, `X-Cache-Key`.
pub fn tag(mut response: Response<Body>, status: CacheStatus, key: &str) -> Response<Body> {
    let headers = response.headers_mut();
    headers.insert(X_CACHE.clone(), HeaderValue::from_static(status.as_str()));
    if let Ok(value) = HeaderValue::from_str(key) {
        headers.insert(X_CACHE_KEY.clone(), value);
    }
    response
}

/// `502` response for a failed upstream call.
pub fn bad_gateway(reason: &str, key: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(format!("Error: {}", reason)));
    *response.status_mut() = StatusCode::BAD_GATEWAY;
    tag(response, CacheStatus::Error, key)
}
