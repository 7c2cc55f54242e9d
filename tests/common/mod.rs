//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use caching_proxy::cache::{CacheStore, MemoryBackend};
use caching_proxy::config::ProxyConfig;
use caching_proxy::http::HttpServer;
use caching_proxy::lifecycle::Shutdown;
use caching_proxy::load_balancer::LoadBalancer;

/// A mock origin that answers every request with a fixed status and body.
pub struct MockOrigin {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
}

impl MockOrigin {
    /// Number of requests served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Start a mock origin on an ephemeral port.
pub async fn start_mock_origin(status: u16, body: &'static str) -> MockOrigin {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let counter = counter.clone();
                    tokio::spawn(async move {
                        serve_one(socket, status, body, counter).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockOrigin { addr, calls }
}

async fn serve_one(mut socket: TcpStream, status: u16, body: &'static str, calls: Arc<AtomicUsize>) {
    if read_request(&mut socket).await.is_none() {
        return;
    }
    calls.fetch_add(1, Ordering::SeqCst);

    let status_text = match status {
        200 => "200 OK",
        201 => "201 Created",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_text,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Read headers and a `Content-Length` body. Returns the raw head.
async fn read_request(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Some(head)
}

/// Start the proxy on an ephemeral port with an in-memory store.
pub async fn start_proxy(origin: &str, balancer: Option<LoadBalancer>) -> (SocketAddr, Shutdown) {
    let (addr, shutdown, _) = start_proxy_with_store(origin, balancer).await;
    (addr, shutdown)
}

/// Like [`start_proxy`], also returning a handle to the proxy's store.
pub async fn start_proxy_with_store(
    origin: &str,
    balancer: Option<LoadBalancer>,
) -> (SocketAddr, Shutdown, CacheStore) {
    let mut config = ProxyConfig::default();
    config.listener.origin = origin.to_string();

    let store = CacheStore::new(Arc::new(MemoryBackend::default()), Duration::from_secs(60));
    let server = HttpServer::new(&config, store.clone(), balancer.map(Arc::new)).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    (addr, shutdown, store)
}

/// A client that never reuses connections or goes through a system proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
