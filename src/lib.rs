//! Caching HTTP proxy.
//!
//! Responses from an origin (or a pool of load-balanced servers) are stored in
//! Redis, a Redis cluster, or process memory, and replayed for identical
//! `GET`/`HEAD` requests until their TTL expires.

// Core subsystems
pub mod cache;
pub mod config;
pub mod http;
pub mod load_balancer;

// Operations
pub mod admin;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use cache::CacheStore;
pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use load_balancer::LoadBalancer;
