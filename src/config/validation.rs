//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (TTL > 0, weights > 0, addresses parse)
//! - Check the server list is usable for load balancing
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{ProxyConfig, StoreKind};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("listener.origin: {0}")]
    InvalidOrigin(String),

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("cache.redis_url: '{0}' is not a valid URL")]
    InvalidRedisUrl(String),

    #[error("load_balancer.servers: server name must not be empty")]
    EmptyServerName,

    #[error("load_balancer.servers: duplicate server '{0}'")]
    DuplicateServer(String),

    #[error("load_balancer.servers: server '{0}' has weight 0")]
    ZeroWeight(String),

    #[error("load_balancer.enabled requires at least one server")]
    NoServers,
}

/// Validate a configuration that will run the proxy.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = validate_store(config);

    check_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_addr(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }
    if config.admin.enabled {
        check_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }

    if let Err(reason) = parse_origin(&config.listener.origin) {
        errors.push(ValidationError::InvalidOrigin(reason));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::NotPositive("listener.max_body_bytes"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::NotPositive("timeouts.request_secs"));
    }

    let lb = &config.load_balancer;
    if lb.enabled && lb.servers.is_empty() {
        errors.push(ValidationError::NoServers);
    }
    let mut seen = HashSet::new();
    for server in &lb.servers {
        if server.name.trim().is_empty() {
            errors.push(ValidationError::EmptyServerName);
        } else if !seen.insert(server.name.as_str()) {
            errors.push(ValidationError::DuplicateServer(server.name.clone()));
        }
        if server.weight == 0 {
            errors.push(ValidationError::ZeroWeight(server.name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate only the cache store section (used by the maintenance commands).
pub fn validate_store_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let errors = validate_store(config);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_store(config: &ProxyConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let cache = &config.cache;

    if cache.default_ttl_secs == 0 {
        errors.push(ValidationError::NotPositive("cache.default_ttl_secs"));
    }
    if cache.count_page_size == 0 {
        errors.push(ValidationError::NotPositive("cache.count_page_size"));
    }
    if cache.scan_batch_size == 0 {
        errors.push(ValidationError::NotPositive("cache.scan_batch_size"));
    }
    if cache.backend == StoreKind::Redis {
        for url in std::iter::once(&cache.redis_url).chain(&cache.cluster_nodes) {
            if Url::parse(url).is_err() {
                errors.push(ValidationError::InvalidRedisUrl(url.clone()));
            }
        }
    }
    errors
}

/// Parse the origin into a base URL without trailing slash.
pub fn parse_origin(origin: &str) -> Result<String, String> {
    if origin.is_empty() {
        return Err("origin is required".to_string());
    }
    let url = Url::parse(origin).map_err(|e| format!("'{}' is not a valid URL: {}", origin, e))?;
    if url.scheme() != "http" {
        return Err(format!("'{}' must use the http scheme", origin));
    }
    if url.host_str().is_none() {
        return Err(format!("'{}' has no host", origin));
    }
    Ok(origin.trim_end_matches('/').to_string())
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
