//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (method, url, headers, body)
//!     → key.rs (canonical key: "cache:" + sha256)
//!     → store.rs (get / set / delete / clear / count, fail-closed)
//!     → backend.rs (StoreBackend capability set)
//!         - memory.rs (in-process, single node)
//!         - redis.rs (single node via SCAN cursor, or cluster via per-node SCAN)
//!     → entry.rs (stored payload ↔ HTTP response)
//! ```
//!
//! # Design Decisions
//! - The store is the only source of truth; no in-process cache in front of it
//! - Entries expire by TTL only, plus explicit delete/clear
//! - Topology is chosen once at construction; callers only see `is_cluster`

pub mod backend;
pub mod entry;
pub mod key;
pub mod memory;
pub mod redis;
pub mod store;

pub use backend::{StoreBackend, StoreError, StoreResult};
pub use entry::CachedResponse;
pub use key::{cache_key, cache_key_for_request};
pub use memory::MemoryBackend;
pub use redis::{RedisBackend, RedisClusterBackend};
pub use store::{CacheStats, CacheStore};
