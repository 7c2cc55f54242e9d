//! End-to-end request flow through the caching proxy.

use caching_proxy::load_balancer::{LoadBalancer, Server, Strategy};

mod common;

#[tokio::test]
async fn test_miss_then_hit() {
    let origin = common::start_mock_origin(200, "hello").await;
    let (proxy, shutdown) = common::start_proxy(&format!("http://{}", origin.addr), None).await;
    let client = common::client();
    let url = format!("http://{}/greeting?lang=en", proxy);

    let first = client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(first.headers()["x-cache"], "MISS");
    let key = first.headers()["x-cache-key"].to_str().unwrap().to_string();
    assert!(key.starts_with("cache:"));
    assert_eq!(first.text().await.unwrap(), "hello");

    let second = client.get(&url).send().await.unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(second.headers()["x-cache-key"], key.as_str());
    assert_eq!(second.headers()["content-type"], "text/plain");
    assert_eq!(second.text().await.unwrap(), "hello");

    assert_eq!(origin.calls(), 1);
    shutdown.trigger();
}

#[tokio::test]
async fn test_clear_all_evicts_proxied_entries() {
    let origin = common::start_mock_origin(200, "hello").await;
    let (proxy, shutdown, store) =
        common::start_proxy_with_store(&format!("http://{}", origin.addr), None).await;
    let client = common::client();
    let url = format!("http://{}/cached", proxy);

    let first = client.get(&url).send().await.unwrap();
    assert_eq!(first.headers()["x-cache"], "MISS");
    assert_eq!(store.stats().await.total_keys, 1);

    assert!(store.clear_all().await);
    assert_eq!(store.stats().await.total_keys, 0);

    let second = client.get(&url).send().await.unwrap();
    assert_eq!(second.headers()["x-cache"], "MISS");
    assert_eq!(origin.calls(), 2);
    shutdown.trigger();
}

#[tokio::test]
async fn test_negotiation_headers_split_entries() {
    let origin = common::start_mock_origin(200, "body").await;
    let (proxy, shutdown) = common::start_proxy(&format!("http://{}", origin.addr), None).await;
    let client = common::client();
    let url = format!("http://{}/page", proxy);

    let json = client.get(&url).header("accept", "application/json").send().await.unwrap();
    let html = client.get(&url).header("accept", "text/html").send().await.unwrap();
    assert_eq!(json.headers()["x-cache"], "MISS");
    assert_eq!(html.headers()["x-cache"], "MISS");
    assert_ne!(json.headers()["x-cache-key"], html.headers()["x-cache-key"]);

    // Headers outside the negotiation set do not split the cache
    let traced = client
        .get(&url)
        .header("accept", "text/html")
        .header("x-trace-id", "123")
        .send()
        .await
        .unwrap();
    assert_eq!(traced.headers()["x-cache"], "HIT");

    assert_eq!(origin.calls(), 2);
    shutdown.trigger();
}

#[tokio::test]
async fn test_post_is_never_cached() {
    let origin = common::start_mock_origin(201, "created").await;
    let (proxy, shutdown) = common::start_proxy(&format!("http://{}", origin.addr), None).await;
    let client = common::client();
    let url = format!("http://{}/items", proxy);

    for _ in 0..2 {
        let res = client.post(&url).body("name=a").send().await.unwrap();
        assert_eq!(res.status(), 201);
        assert_eq!(res.headers()["x-cache"], "MISS");
    }
    assert_eq!(origin.calls(), 2);
    shutdown.trigger();
}

#[tokio::test]
async fn test_error_status_not_cached() {
    let origin = common::start_mock_origin(500, "boom").await;
    let (proxy, shutdown) = common::start_proxy(&format!("http://{}", origin.addr), None).await;
    let client = common::client();
    let url = format!("http://{}/fail", proxy);

    for _ in 0..2 {
        let res = client.get(&url).send().await.unwrap();
        assert_eq!(res.status(), 500);
        assert_eq!(res.headers()["x-cache"], "MISS");
    }
    assert_eq!(origin.calls(), 2);
    shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_origin_returns_bad_gateway() {
    // Bind then drop to get a port with nothing listening
    let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);

    let (proxy, shutdown) = common::start_proxy(&format!("http://{}", addr), None).await;
    let res = common::client()
        .get(format!("http://{}/anything", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 502);
    assert_eq!(res.headers()["x-cache"], "ERROR");
    assert!(res.text().await.unwrap().starts_with("Error: "));
    shutdown.trigger();
}

#[tokio::test]
async fn test_round_robin_across_servers() {
    let a = common::start_mock_origin(200, "a").await;
    let b = common::start_mock_origin(200, "b").await;
    let fallback = common::start_mock_origin(200, "origin").await;

    let lb = LoadBalancer::new(
        vec![Server::new(a.addr.to_string(), 1), Server::new(b.addr.to_string(), 1)],
        Strategy::RoundRobin,
    );
    let (proxy, shutdown) = common::start_proxy(&format!("http://{}", fallback.addr), Some(lb)).await;
    let client = common::client();

    // Distinct paths so every request misses
    let mut bodies = Vec::new();
    for i in 0..4 {
        let res = client.get(format!("http://{}/r/{}", proxy, i)).send().await.unwrap();
        bodies.push(res.text().await.unwrap());
    }

    assert_eq!(bodies, ["a", "b", "a", "b"]);
    assert_eq!(a.calls(), 2);
    assert_eq!(b.calls(), 2);
    assert_eq!(fallback.calls(), 0);
    shutdown.trigger();
}

#[tokio::test]
async fn test_all_servers_unhealthy_falls_back_to_origin() {
    let a = common::start_mock_origin(200, "a").await;
    let fallback = common::start_mock_origin(200, "origin").await;

    let server = Server::new(a.addr.to_string(), 1);
    server.set_healthy(false);
    let lb = LoadBalancer::new(vec![server], Strategy::WeightedRoundRobin);

    let (proxy, shutdown) = common::start_proxy(&format!("http://{}", fallback.addr), Some(lb)).await;
    let res = common::client()
        .get(format!("http://{}/x", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(res.text().await.unwrap(), "origin");
    assert_eq!(a.calls(), 0);
    assert_eq!(fallback.calls(), 1);
    shutdown.trigger();
}
