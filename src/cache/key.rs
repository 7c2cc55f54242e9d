//! Cache key derivation.
//!
//! # Responsibilities
//! - Turn request identity (method, url, negotiation headers, body) into a fixed-length key
//! - Ignore headers that would fragment the cache (cookies, auth, tracing IDs)
//!
//! # Design Decisions
//! - Pure function, no state
//! - Body digested with MD5 for compactness only; the final key is SHA-256
//! - Header order never influences the key

use std::collections::BTreeMap;

use axum::http::{HeaderMap, Method, Uri};
use md5::Md5;
use sha2::{Digest, Sha256};

/// Prefix carried by every derived key.
pub const KEY_PREFIX: &str = "cache:";

/// Request headers that take part in content negotiation.
pub const KEY_HEADERS: [&str; 3] = ["accept", "accept-encoding", "accept-language"];

/// Derive the cache key for a request.
///
/// `url` is used verbatim, query string included. Header names are matched
/// case-insensitively against [`KEY_HEADERS`]. An empty body is treated as absent.
pub fn cache_key<'a, I>(method: &str, url: &str, headers: I, body: Option<&[u8]>) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut parts = format!("{}:{}", method, url);

    if let Some(canonical) = canonical_headers(headers) {
        parts.push(':');
        parts.push_str(&canonical);
    }

    if let Some(body) = body.filter(|b| !b.is_empty()) {
        parts.push(':');
        parts.push_str(&hex::encode(Md5::digest(body)));
    }

    format!("{}{}", KEY_PREFIX, hex::encode(Sha256::digest(parts.as_bytes())))
}

/// Derive the cache key straight from axum request parts.
pub fn cache_key_for_request(method: &Method, uri: &Uri, headers: &HeaderMap, body: &[u8]) -> String {
    let url = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());

    let values: Vec<(&str, String)> = headers
        .iter()
        .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
        .collect();

    cache_key(
        method.as_str(),
        url,
        values.iter().map(|(name, value)| (*name, value.as_str())),
        Some(body),
    )
}

/// Serialize the allow-listed headers as a JSON object with sorted keys.
///
/// Repeated headers are sorted and joined with `,` so insertion order is irrelevant.
fn canonical_headers<'a, I>(headers: I) -> Option<String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut filtered: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.to_ascii_lowercase();
        if KEY_HEADERS.contains(&name.as_str()) {
            filtered.entry(name).or_default().push(value);
        }
    }

    if filtered.is_empty() {
        return None;
    }

    let canonical: BTreeMap<String, String> = filtered
        .into_iter()
        .map(|(name, mut values)| {
            values.sort_unstable();
            (name, values.join(","))
        })
        .collect();

    serde_json::to_string(&canonical).ok()
}
