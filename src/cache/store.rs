//! Fail-closed cache facade.
//!
//! # Responsibilities
//! - Apply the default TTL
//! - Convert every backend failure into a miss, `false`, or zero
//! - Record cache operation metrics
//!
//! # Design Decisions
//! - Failure to read is a miss; failure to write is "not cached", never a request error
//! - Partial multi-node failures are reported as failures, already-deleted keys stay deleted

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::cache::backend::{StoreBackend, StoreError, StoreResult};
use crate::cache::entry::CachedResponse;
use crate::cache::key::KEY_PREFIX;
use crate::cache::memory::MemoryBackend;
use crate::cache::redis::{RedisBackend, RedisClusterBackend, ScanOptions};
use crate::config::{CacheConfig, StoreKind};
use crate::observability::metrics;

/// Result of a prefix count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Keys found (one bounded scan page per node; approximate).
    pub total_keys: u64,
    /// Whether the backend is a sharded cluster.
    pub cluster_mode: bool,
    /// Set when the count failed on at least one node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Shared handle to the response cache.
#[derive(Debug, Clone)]
pub struct CacheStore {
    backend: Arc<dyn StoreBackend>,
    default_ttl: Duration,
}

impl CacheStore {
    /// Wrap an existing backend.
    pub fn new(backend: Arc<dyn StoreBackend>, default_ttl: Duration) -> Self {
        Self { backend, default_ttl }
    }

    /// Build the backend selected by configuration and connect to it.
    pub async fn connect(config: &CacheConfig) -> StoreResult<Self> {
        let scan = ScanOptions {
            batch_size: config.scan_batch_size,
            count_page_size: config.count_page_size,
        };

        let backend: Arc<dyn StoreBackend> = match config.backend {
            StoreKind::Memory => Arc::new(MemoryBackend::new(config.count_page_size)),
            StoreKind::Redis if config.cluster_mode => {
                let mut seeds = vec![config.redis_url.clone()];
                seeds.extend(config.cluster_nodes.iter().cloned());
                Arc::new(RedisClusterBackend::connect(&seeds, scan).await?)
            }
            StoreKind::Redis => Arc::new(RedisBackend::connect(&config.redis_url, scan).await?),
        };

        tracing::info!(
            backend = ?config.backend,
            cluster_mode = backend.is_cluster(),
            default_ttl_secs = config.default_ttl_secs,
            "Cache store ready"
        );

        Ok(Self::new(backend, Duration::from_secs(config.default_ttl_secs)))
    }

    /// Prefix shared by all keys this store manages.
    pub fn key_prefix(&self) -> &'static str {
        KEY_PREFIX
    }

    /// TTL applied when `set` is called without one.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Whether the backend is a sharded cluster.
    pub fn is_cluster(&self) -> bool {
        self.backend.is_cluster()
    }

    /// Fetch a payload. Any failure is reported as a miss.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.backend.get(key).await {
            Ok(value) => {
                metrics::record_cache_op("get", if value.is_some() { "hit" } else { "miss" });
                value
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                metrics::record_cache_op("get", "error");
                None
            }
        }
    }

    /// Store a payload, expiring after `ttl` (or the default TTL). Returns whether it was written.
    pub async fn set(&self, key: &str, payload: &[u8], ttl: Option<Duration>) -> bool {
        let ttl = ttl.unwrap_or(self.default_ttl);
        match self.backend.set_ex(key, payload, ttl).await {
            Ok(()) => {
                metrics::record_cache_op("set", "ok");
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache write failed");
                metrics::record_cache_op("set", "error");
                false
            }
        }
    }

    /// Read a stored response. An undecodable entry counts as a miss.
    pub async fn get_response(&self, key: &str) -> Option<CachedResponse> {
        let payload = self.get(key).await?;
        match CachedResponse::decode(&payload).map_err(StoreError::from) {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Ignoring undecodable cache entry");
                metrics::record_cache_op("decode", "error");
                None
            }
        }
    }

    /// Encode and store a response. Returns whether it was written.
    pub async fn set_response(&self, key: &str, response: &CachedResponse, ttl: Option<Duration>) -> bool {
        match response.encode().map_err(StoreError::from) {
            Ok(payload) => self.set(key, &payload, ttl).await,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to encode response");
                metrics::record_cache_op("encode", "error");
                false
            }
        }
    }

    /// Remove one key. True only if it existed and was removed.
    pub async fn delete(&self, key: &str) -> bool {
        match self.backend.delete(key).await {
            Ok(removed) => {
                metrics::record_cache_op("delete", if removed { "ok" } else { "miss" });
                removed
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache delete failed");
                metrics::record_cache_op("delete", "error");
                false
            }
        }
    }

    /// Remove every key starting with `prefix` on every node.
    ///
    /// Returns false if any node failed; keys already removed stay removed.
    pub async fn clear_by_prefix(&self, prefix: &str) -> bool {
        match self.backend.delete_prefixed(prefix).await {
            Ok(removed) => {
                tracing::info!(prefix = %prefix, removed, "Cleared cache entries");
                metrics::record_cache_op("clear", "ok");
                true
            }
            Err(StoreError::Partial { completed, failed_nodes, total_nodes, reason }) => {
                tracing::warn!(
                    prefix = %prefix,
                    removed = completed,
                    failed_nodes,
                    total_nodes,
                    reason = %reason,
                    "Cache clear incomplete"
                );
                metrics::record_cache_op("clear", "partial");
                false
            }
            Err(e) => {
                tracing::warn!(prefix = %prefix, error = %e, "Cache clear failed");
                metrics::record_cache_op("clear", "error");
                false
            }
        }
    }

    /// Remove every key this store manages.
    pub async fn clear_all(&self) -> bool {
        self.clear_by_prefix(KEY_PREFIX).await
    }

    /// Approximate count of keys starting with `prefix`.
    pub async fn count_by_prefix(&self, prefix: &str) -> CacheStats {
        let cluster_mode = self.backend.is_cluster();
        match self.backend.count_prefixed(prefix).await {
            Ok(total_keys) => CacheStats {
                total_keys,
                cluster_mode,
                error: None,
            },
            Err(e) => {
                tracing::warn!(prefix = %prefix, error = %e, "Cache count failed");
                let total_keys = match &e {
                    StoreError::Partial { completed, .. } => *completed,
                    _ => 0,
                };
                CacheStats {
                    total_keys,
                    cluster_mode,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Statistics over every key this store manages.
    pub async fn stats(&self) -> CacheStats {
        self.count_by_prefix(KEY_PREFIX).await
    }
}
