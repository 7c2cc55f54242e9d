//! Redis backends.
//!
//! # Topologies
//! - [`RedisBackend`]: one node, prefix operations walk the keyspace with a `SCAN` cursor
//! - [`RedisClusterBackend`]: keyed operations go through the cluster client; prefix
//!   operations discover the slot-serving masters and scan each one directly
//!
//! # Design Decisions
//! - Master list is rediscovered for every prefix operation (topology may change)
//! - In cluster mode keys are deleted one command each, pipelined per node, so no
//!   command ever spans hash slots
//! - A node failure does not stop the other nodes; the result reports it as partial

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionLike, ConnectionManager, MultiplexedConnection};
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::AsyncCommands;
use url::Url;

use crate::cache::backend::{merge_node_results, prefix_pattern, StoreBackend, StoreError, StoreResult};

/// Paging options shared by both topologies.
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// `COUNT` hint while walking keys for deletion.
    pub batch_size: usize,
    /// `COUNT` hint for the single statistics page.
    pub count_page_size: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            batch_size: 500,
            count_page_size: 1000,
        }
    }
}

/// Single-node Redis.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    scan: ScanOptions,
}

impl fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBackend")
            .field("scan", &self.scan)
            .finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/`).
    pub async fn connect(url: &str, scan: ScanOptions) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!(url = %url, "Connected to Redis");
        Ok(Self { conn, scan })
    }
}

#[async_trait]
impl StoreBackend for RedisBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        set_with_expiry(&mut conn, key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn delete_prefixed(&self, prefix: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let pattern = prefix_pattern(prefix);
        let mut cursor = 0;
        let mut removed = 0;

        loop {
            let (next, keys) = scan_page(&mut conn, cursor, &pattern, self.scan.batch_size).await?;
            if !keys.is_empty() {
                let n: u64 = conn.del(&keys).await?;
                removed += n;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }

    async fn count_prefixed(&self, prefix: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let (_, keys) = scan_page(&mut conn, 0, &prefix_pattern(prefix), self.scan.count_page_size).await?;
        Ok(keys.len() as u64)
    }

    fn is_cluster(&self) -> bool {
        false
    }
}

/// Redis Cluster.
#[derive(Clone)]
pub struct RedisClusterBackend {
    conn: ClusterConnection,
    seed: Url,
    scan: ScanOptions,
}

impl fmt::Debug for RedisClusterBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisClusterBackend")
            .field("seed", &self.seed.as_str())
            .field("scan", &self.scan)
            .finish_non_exhaustive()
    }
}

impl RedisClusterBackend {
    /// Connect using one or more seed node URLs.
    pub async fn connect(seeds: &[String], scan: ScanOptions) -> StoreResult<Self> {
        let first = seeds
            .first()
            .ok_or_else(|| StoreError::Unavailable("no cluster seed nodes configured".into()))?;
        let seed = Url::parse(first)
            .map_err(|e| StoreError::Unavailable(format!("invalid seed node URL {first}: {e}")))?;

        let client = ClusterClient::new(seeds.to_vec())?;
        let conn = client.get_async_connection().await?;
        tracing::info!(seeds = seeds.len(), "Connected to Redis cluster");

        Ok(Self { conn, seed, scan })
    }

    /// Addresses of the masters currently serving slots.
    async fn masters(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let nodes: String = redis::cmd("CLUSTER").arg("NODES").query_async(&mut conn).await?;
        let masters = parse_cluster_nodes(&nodes);
        if masters.is_empty() {
            return Err(StoreError::Unavailable("cluster reported no masters".into()));
        }
        Ok(masters)
    }

    async fn node_connection(&self, addr: &str) -> StoreResult<MultiplexedConnection> {
        let url = node_url(&self.seed, addr)
            .ok_or_else(|| StoreError::Unavailable(format!("cannot address node {addr}")))?;
        let client = redis::Client::open(url.as_str())?;
        Ok(client.get_multiplexed_async_connection().await?)
    }

    async fn delete_on_node(&self, addr: &str, pattern: &str) -> StoreResult<u64> {
        let mut node = self.node_connection(addr).await?;
        let mut cursor = 0;
        let mut removed = 0;

        loop {
            let (next, keys) = scan_page(&mut node, cursor, pattern, self.scan.batch_size).await?;
            if !keys.is_empty() {
                let mut pipe = redis::pipe();
                for key in &keys {
                    pipe.del(key);
                }
                let counts: Vec<u64> = pipe.query_async(&mut node).await?;
                removed += counts.iter().sum::<u64>();
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(node = %addr, removed, "Cleared node");
        Ok(removed)
    }

    async fn count_on_node(&self, addr: &str, pattern: &str) -> StoreResult<u64> {
        let mut node = self.node_connection(addr).await?;
        let (_, keys) = scan_page(&mut node, 0, pattern, self.scan.count_page_size).await?;
        Ok(keys.len() as u64)
    }
}

#[async_trait]
impl StoreBackend for RedisClusterBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        set_with_expiry(&mut conn, key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn delete_prefixed(&self, prefix: &str) -> StoreResult<u64> {
        let pattern = prefix_pattern(prefix);
        let mut results = Vec::new();
        for addr in self.masters().await? {
            let result = self.delete_on_node(&addr, &pattern).await;
            if let Err(e) = &result {
                tracing::warn!(node = %addr, error = %e, "Failed to clear node");
            }
            results.push(result);
        }
        merge_node_results(results)
    }

    async fn count_prefixed(&self, prefix: &str) -> StoreResult<u64> {
        let pattern = prefix_pattern(prefix);
        let mut results = Vec::new();
        for addr in self.masters().await? {
            results.push(self.count_on_node(&addr, &pattern).await);
        }
        merge_node_results(results)
    }

    fn is_cluster(&self) -> bool {
        true
    }
}

async fn set_with_expiry<C>(conn: &mut C, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()>
where
    C: ConnectionLike + Send,
{
    let secs = ttl.as_secs();
    if secs == 0 {
        return Err(StoreError::Unavailable("TTL must be at least one second".into()));
    }
    let _: () = redis::cmd("SET")
        .arg(key)
        .arg(value)
        .arg("EX")
        .arg(secs)
        .query_async(conn)
        .await?;
    Ok(())
}

async fn scan_page<C>(conn: &mut C, cursor: u64, pattern: &str, count: usize) -> StoreResult<(u64, Vec<String>)>
where
    C: ConnectionLike + Send,
{
    let page: (u64, Vec<String>) = redis::cmd("SCAN")
        .arg(cursor)
        .arg("MATCH")
        .arg(pattern)
        .arg("COUNT")
        .arg(count)
        .query_async(conn)
        .await?;
    Ok(page)
}

/// Extract `host:port` of every master that serves at least one slot from
/// `CLUSTER NODES` output.
pub fn parse_cluster_nodes(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            // id addr flags master ping pong epoch link slot...
            if fields.len() < 9 {
                return None;
            }
            let flags: Vec<&str> = fields[2].split(',').collect();
            if !flags.contains(&"master") || flags.contains(&"noaddr") || flags.contains(&"handshake") {
                return None;
            }
            let addr = fields[1].split('@').next()?;
            if addr.is_empty() || addr.starts_with(':') {
                return None;
            }
            Some(addr.to_string())
        })
        .collect()
}

/// Point the seed URL (scheme, credentials, db) at another node.
fn node_url(seed: &Url, addr: &str) -> Option<Url> {
    let (host, port) = addr.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    let host = if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_string()
    };

    let mut url = seed.clone();
    url.set_host(Some(&host)).ok()?;
    url.set_port(Some(port)).ok()?;
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODES: &str = "\
07c37dfeb235213a872192d90877d0cd55635b91 127.0.0.1:30004@31004 slave e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 0 1426238317239 4 connected
67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 127.0.0.1:30002@31002 master - 0 1426238316232 2 connected 5461-10922
292f8b365bb7edb5e285caf0b7e6ddc7265d2f4f 127.0.0.1:30003@31003 master - 0 1426238318243 3 connected 10923-16383
6ec23923021cf3ffec47632106199cb7f496ce01 127.0.0.1:30005@31005,node-5.local slave 67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 0 1426238316232 5 connected
e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 127.0.0.1:30001@31001 myself,master - 0 0 1 connected 0-5460
a1b2c3d4e5f60718293a4b5c6d7e8f9012345678 :0@0 master,noaddr - 1426238316232 1426238316232 6 disconnected
f1e2d3c4b5a60718293a4b5c6d7e8f9012345678 127.0.0.1:30006@31006 master,fail - 1426238316232 1426238316232 7 disconnected
";

    #[test]
    fn test_parse_masters_with_slots() {
        let masters = parse_cluster_nodes(NODES);
        assert_eq!(
            masters,
            vec!["127.0.0.1:30002", "127.0.0.1:30003", "127.0.0.1:30001"]
        );
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_cluster_nodes("").is_empty());
    }

    #[test]
    fn test_node_url_keeps_credentials() {
        let seed = Url::parse("redis://:secret@10.0.0.1:7000/0").unwrap();
        let url = node_url(&seed, "10.0.0.2:7001").unwrap();
        assert_eq!(url.as_str(), "redis://:secret@10.0.0.2:7001/0");

        let v6 = node_url(&seed, "::1:7002").unwrap();
        assert_eq!(v6.host_str(), Some("[::1]"));
        assert_eq!(v6.port(), Some(7002));

        assert!(node_url(&seed, "no-port").is_none());
    }
}
