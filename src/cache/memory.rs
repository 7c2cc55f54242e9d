//! In-process single-node backend.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::cache::backend::{StoreBackend, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct Slot {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// A process-local store with per-key expiry.
///
/// Expired entries are dropped lazily when touched or scanned.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: DashMap<String, Slot>,
    count_page_size: usize,
}

impl MemoryBackend {
    /// Create an empty backend. `count_page_size` bounds `count_prefixed`.
    pub fn new(count_page_size: usize) -> Self {
        Self {
            entries: DashMap::new(),
            count_page_size,
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let now = Instant::now();
        if let Some(slot) = self.entries.get(key) {
            if slot.is_live(now) {
                return Ok(Some(slot.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, slot| !slot.is_live(now));
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        if ttl.is_zero() {
            return Err(StoreError::Unavailable("TTL must be positive".into()));
        }
        self.entries.insert(
            key.to_string(),
            Slot {
                value: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, slot)| slot.is_live(now)))
    }

    async fn delete_prefixed(&self, prefix: &str) -> StoreResult<u64> {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|key, slot| {
            if !slot.is_live(now) {
                return false;
            }
            if key.starts_with(prefix) {
                removed += 1;
                return false;
            }
            true
        });
        Ok(removed)
    }

    async fn count_prefixed(&self, prefix: &str) -> StoreResult<u64> {
        let now = Instant::now();
        let count = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && entry.value().is_live(now))
            .take(self.count_page_size)
            .count();
        Ok(count as u64)
    }

    fn is_cluster(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let backend = MemoryBackend::default();
        backend.set_ex("k", b"v", Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(backend.get("k").await.unwrap(), Some(b"v".to_vec()));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(!backend.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected() {
        let backend = MemoryBackend::default();
        assert!(backend.set_ex("k", b"v", Duration::ZERO).await.is_err());
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_count_is_bounded_by_page() {
        let backend = MemoryBackend::new(3);
        for i in 0..5 {
            backend
                .set_ex(&format!("cache:{i}"), b"v", Duration::from_secs(60))
                .await
                .unwrap();
        }
        backend.set_ex("other", b"v", Duration::from_secs(60)).await.unwrap();

        assert_eq!(backend.count_prefixed("cache:").await.unwrap(), 3);
        assert_eq!(backend.delete_prefixed("cache:").await.unwrap(), 5);
        assert_eq!(backend.count_prefixed("cache:").await.unwrap(), 0);
        assert_eq!(backend.get("other").await.unwrap(), Some(b"v".to_vec()));
    }
}
