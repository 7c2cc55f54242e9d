//! Key-value backend abstraction.
//!
//! # Responsibilities
//! - Define the capability set the cache store needs from a backend
//! - Hide whether keys live on one node or are sharded across many
//!
//! # Design Decisions
//! - One trait, one implementation per topology, chosen at construction
//! - Backends report errors; the store above decides how to degrade
//! - Multi-node operations report partial completion instead of rolling back

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Result alias for backend operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by key-value backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis command or connection failure.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Payload could not be encoded or decoded.
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// A multi-node operation finished on some nodes only.
    #[error("Operation incomplete: {failed_nodes} of {total_nodes} nodes failed ({reason})")]
    Partial {
        /// Keys processed on the nodes that succeeded.
        completed: u64,
        /// Number of nodes that failed.
        failed_nodes: usize,
        /// Number of nodes attempted.
        total_nodes: usize,
        /// First failure observed.
        reason: String,
    },

    /// Backend is not usable (bad topology, no nodes, invalid TTL).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Operations a key-value backend must provide.
///
/// All methods may suspend on I/O and must be safe to call concurrently.
#[async_trait]
pub trait StoreBackend: Send + Sync + fmt::Debug {
    /// Fetch the value stored under `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write `value` under `key`, expiring after `ttl`. Overwrites any existing value.
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()>;

    /// Remove `key`. Returns true if it existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Remove every key starting with `prefix`, on every node. Returns the number removed.
    async fn delete_prefixed(&self, prefix: &str) -> StoreResult<u64>;

    /// Count keys starting with `prefix` using one bounded scan page per node.
    async fn count_prefixed(&self, prefix: &str) -> StoreResult<u64>;

    /// Whether keys are sharded across several nodes.
    fn is_cluster(&self) -> bool;
}

/// Build a `SCAN MATCH` pattern matching every key that starts with `prefix`.
pub fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

/// Collapse per-node outcomes into one result.
///
/// Any failed node turns the whole operation into [`StoreError::Partial`];
/// work done on the other nodes is reported, not undone.
pub(crate) fn merge_node_results(results: Vec<StoreResult<u64>>) -> StoreResult<u64> {
    let total_nodes = results.len();
    let mut completed = 0;
    let mut failed_nodes = 0;
    let mut reason = None;

    for result in results {
        match result {
            Ok(n) => completed += n,
            Err(e) => {
                failed_nodes += 1;
                reason.get_or_insert_with(|| e.to_string());
            }
        }
    }

    match reason {
        None => Ok(completed),
        Some(reason) => Err(StoreError::Partial {
            completed,
            failed_nodes,
            total_nodes,
            reason,
        }),
    }
}
