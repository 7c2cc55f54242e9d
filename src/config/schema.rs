//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::load_balancer::Strategy;

/// Root configuration for the caching proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, origin).
    pub listener: ListenerConfig,

    /// Cache store settings.
    pub cache: CacheConfig,

    /// Backend selection settings.
    pub load_balancer: LoadBalancerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Origin server used when load balancing is off or has no healthy server.
    pub origin: String,

    /// Largest request body buffered for key derivation and forwarding.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            origin: String::new(),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Which key-value store backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    #[default]
    Redis,
    Memory,
}

/// Cache store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Store implementation.
    pub backend: StoreKind,

    /// Redis URL (the first seed node in cluster mode).
    pub redis_url: String,

    /// Use Redis Cluster instead of a single node.
    pub cluster_mode: bool,

    /// Additional cluster seed node URLs.
    pub cluster_nodes: Vec<String>,

    /// TTL applied to cached responses, in seconds.
    pub default_ttl_secs: u64,

    /// `SCAN COUNT` used for the single statistics page.
    pub count_page_size: usize,

    /// `SCAN COUNT` used while clearing.
    pub scan_batch_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: StoreKind::Redis,
            redis_url: "redis://127.0.0.1:6379/".to_string(),
            cluster_mode: false,
            cluster_nodes: Vec::new(),
            default_ttl_secs: 3600,
            count_page_size: 1000,
            scan_batch_size: 500,
        }
    }
}

/// Load balancer configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// Enable load balancing across `servers`.
    pub enabled: bool,

    /// Selection algorithm.
    pub strategy: Strategy,

    /// Backend servers.
    pub servers: Vec<ServerConfig>,
}

/// Backend server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Backend address, used as `http://{name}` (e.g., "127.0.0.1:3000").
    pub name: String,

    /// Weight for weighted load balancing (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl std::str::FromStr for ServerConfig {
    type Err = String;

    /// Parse `NAME[=WEIGHT]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, weight) = match s.rsplit_once('=') {
            Some((name, weight)) => {
                let weight = weight
                    .trim()
                    .parse()
                    .map_err(|e| format!("invalid weight in '{}': {}", s, e))?;
                (name, weight)
            }
            None => (s, default_weight()),
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("missing server name in '{}'", s));
        }
        Ok(Self {
            name: name.to_string(),
            weight,
        })
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
