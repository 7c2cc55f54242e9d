//! Caching forward handler.
//!
//! # Flow
//! ```text
//! request → buffer body (413 over the limit, 400 if unreadable) → derive key
//!     → GET/HEAD and stored?  → replay (X-Cache: HIT)
//!     → pick target (balancer, else origin) → forward → strip hop-by-hop
//!     → 2xx and GET/HEAD?     → store
//!     → respond (X-Cache: MISS), or 502 (X-Cache: ERROR) on upstream failure
//! ```

use std::time::Instant;

use axum::body::Body;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, Request, Response, StatusCode, Uri};
use bytes::Bytes;

use crate::cache::key::cache_key_for_request;
use crate::cache::CachedResponse;
use crate::http::request::request_id;
use crate::http::response::{bad_gateway, strip_hop_by_hop, tag, CacheStatus};
use crate::http::server::AppState;
use crate::load_balancer::ConnectionGuard;
use crate::observability::metrics;

/// Whether responses to `method` may be stored and replayed.
pub fn is_cacheable(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

/// Proxy one request through the cache.
///
/// The body is buffered under the router's `DefaultBodyLimit`.
pub async fn proxy_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response<Body> {
    let start = Instant::now();
    state.stats.record_request();

    let request_id = request_id(&headers).to_string();
    let method_str = method.to_string();
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    let body = match body {
        Ok(body) => body,
        Err(rejection) => return body_rejected(&state, &request_id, &method_str, rejection, start),
    };

    let key = cache_key_for_request(&method, &uri, &headers, &body);
    let cacheable = is_cacheable(&method);

    if cacheable {
        if let Some(cached) = state.store.get_response(&key).await {
            state.stats.record_hit();
            tracing::info!(request_id = %request_id, method = %method_str, path = %path, "Cache HIT");
            let response = tag(cached.into_response(), CacheStatus::Hit, &key);
            metrics::record_request(&method_str, response.status().as_u16(), CacheStatus::Hit.as_str(), start);
            return response;
        }
    }

    state.stats.record_miss();
    tracing::info!(request_id = %request_id, method = %method_str, path = %path, "Cache MISS");

    let guard = state.balancer.as_ref().and_then(|lb| lb.next_server()).map(|server| {
        let guard = server.connection_guard();
        metrics::record_active_connections(guard.name(), guard.active_connections());
        guard
    });
    if state.balancer.is_some() && guard.is_none() {
        tracing::warn!(request_id = %request_id, origin = %state.origin, "No healthy server, using origin");
    }

    let result = forward(&state, &method, &headers, &path, body, guard.as_ref()).await;

    if let Some(guard) = guard {
        let server = guard.server().clone();
        drop(guard);
        metrics::record_active_connections(server.name(), server.active_connections());
    }

    match result {
        Ok((status, headers, body)) => {
            if cacheable && status.is_success() {
                let entry = CachedResponse::new(status, &headers, &body);
                state.store.set_response(&key, &entry, None).await;
            }

            let mut response = Response::new(Body::from(body));
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            metrics::record_request(&method_str, status.as_u16(), CacheStatus::Miss.as_str(), start);
            tag(response, CacheStatus::Miss, &key)
        }
        Err(reason) => {
            state.stats.record_error();
            tracing::error!(request_id = %request_id, path = %path, error = %reason, "Error forwarding request");
            metrics::record_request(&method_str, 502, CacheStatus::Error.as_str(), start);
            bad_gateway(&reason, &key)
        }
    }
}

/// Answer a request whose body could not be buffered.
///
/// Over the size limit is `413`; a broken or aborted body is `400`.
fn body_rejected(
    state: &AppState,
    request_id: &str,
    method: &str,
    rejection: BytesRejection,
    start: Instant,
) -> Response<Body> {
    let status = rejection.status();
    state.stats.record_error();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        tracing::warn!(request_id = %request_id, "Request body exceeds limit");
    } else {
        tracing::warn!(request_id = %request_id, error = %rejection.body_text(), "Failed to read request body");
    }
    metrics::record_request(method, status.as_u16(), CacheStatus::Error.as_str(), start);

    let mut response = Response::new(Body::from(format!("Error: {}", rejection.body_text())));
    *response.status_mut() = status;
    response
}

/// Send the request upstream and buffer the response.
async fn forward(
    state: &AppState,
    method: &Method,
    headers: &HeaderMap,
    path: &str,
    body: Bytes,
    server: Option<&ConnectionGuard>,
) -> Result<(StatusCode, HeaderMap, Bytes), String> {
    let target = match server {
        Some(server) => format!("http://{}{}", server.name(), path),
        None => format!("{}{}", state.origin, path),
    };
    let uri: Uri = target
        .parse()
        .map_err(|e| format!("invalid target url '{}': {}", target, e))?;

    let mut builder = Request::builder().method(method.clone()).uri(uri);
    if let Some(outgoing) = builder.headers_mut() {
        for (name, value) in headers.iter() {
            if name != header::HOST {
                outgoing.append(name.clone(), value.clone());
            }
        }
    }
    let request = builder.body(Body::from(body)).map_err(|e| e.to_string())?;

    let response: Response<hyper::body::Incoming> =
        state.client.request(request).await.map_err(|e| error_chain(&e))?;
    let (mut parts, body) = response.into_parts();
    let body = axum::body::to_bytes(Body::new(body), usize::MAX)
        .await
        .map_err(|e| error_chain(&e))?;

    strip_hop_by_hop(&mut parts.headers);
    Ok((parts.status, parts.headers, body))
}

/// Render an error with its sources, e.g. "client error (Connect): connection refused".
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
