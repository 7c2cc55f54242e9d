//! Caching Proxy
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                CACHING PROXY                 │
//!     Client Request     │  ┌─────────┐    ┌─────────┐    ┌──────────┐  │
//!     ───────────────────┼─▶│  http   │───▶│  cache  │───▶│  store   │◀─┼──── Redis /
//!                        │  │ server  │    │   key   │    │ backend  │  │     Cluster /
//!                        │  └────┬────┘    └─────────┘    └──────────┘  │     Memory
//!                        │       │ miss                                 │
//!                        │       ▼                                      │
//!                        │  ┌──────────────┐                            │
//!                        │  │load_balancer │────────────────────────────┼──── Origin /
//!                        │  └──────────────┘                            │     Servers
//!                        │                                              │
//!                        │  config · observability · lifecycle · admin  │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;

use caching_proxy::admin::setup_admin_router;
use caching_proxy::cache::CacheStore;
use caching_proxy::config::loader::read_config;
use caching_proxy::config::validation::{validate_config, validate_store_config};
use caching_proxy::config::{ConfigError, ProxyConfig, ServerConfig, StoreKind};
use caching_proxy::http::HttpServer;
use caching_proxy::lifecycle::{shutdown, signals, Shutdown};
use caching_proxy::load_balancer::{LoadBalancer, Strategy};
use caching_proxy::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "caching-proxy", version)]
#[command(about = "Caching Proxy Server - Cache responses from origin servers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the caching proxy server
    Start(StartArgs),
    /// Clear all cached data
    ClearCache(StoreArgs),
    /// Show cache statistics
    Stats(StoreArgs),
}

#[derive(Args)]
struct StoreArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Redis URL (first seed node in cluster mode)
    #[arg(long)]
    redis_url: Option<String>,

    /// Use Redis cluster
    #[arg(long)]
    use_cluster: bool,
}

#[derive(Args)]
struct StartArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Port to run the proxy server on
    #[arg(short, long)]
    port: Option<u16>,

    /// Origin server URL
    #[arg(short, long)]
    origin: Option<String>,

    /// Cache TTL in seconds
    #[arg(long)]
    cache_ttl: Option<u64>,

    /// Keep the cache in process memory instead of Redis
    #[arg(long)]
    memory_store: bool,

    /// Enable load balancing
    #[arg(long)]
    load_balance: bool,

    /// Backend server for load balancing, repeatable
    #[arg(long = "server", value_name = "NAME[=WEIGHT]")]
    servers: Vec<ServerConfig>,

    /// Load balancing strategy
    #[arg(long)]
    strategy: Option<Strategy>,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start(args) => start(args).await,
        Commands::ClearCache(args) => clear_cache(args).await,
        Commands::Stats(args) => stats(args).await,
    }
}

/// Read the file if given, otherwise start from defaults.
fn base_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    match path {
        Some(path) => read_config(path),
        None => Ok(ProxyConfig::default()),
    }
}

fn apply_store_args(config: &mut ProxyConfig, args: &StoreArgs) {
    if let Some(url) = &args.redis_url {
        config.cache.redis_url = url.clone();
    }
    if args.use_cluster {
        config.cache.cluster_mode = true;
    }
}

async fn connect_store(args: &StoreArgs) -> Result<CacheStore, Box<dyn std::error::Error>> {
    let mut config = base_config(args.config.as_deref())?;
    apply_store_args(&mut config, args);
    logging::init(&config.observability.log_level);
    validate_store_config(&config).map_err(ConfigError::Validation)?;
    Ok(CacheStore::connect(&config.cache).await?)
}

async fn start(args: StartArgs) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = base_config(args.store.config.as_deref())?;
    apply_store_args(&mut config, &args.store);
    if let Some(port) = args.port {
        config.listener.bind_address = format!("0.0.0.0:{}", port);
    }
    if let Some(origin) = args.origin {
        config.listener.origin = origin;
    }
    if let Some(ttl) = args.cache_ttl {
        config.cache.default_ttl_secs = ttl;
    }
    if args.memory_store {
        config.cache.backend = StoreKind::Memory;
    }
    if args.load_balance {
        config.load_balancer.enabled = true;
    }
    if !args.servers.is_empty() {
        config.load_balancer.servers = args.servers;
    }
    if let Some(strategy) = args.strategy {
        config.load_balancer.strategy = strategy;
    }

    logging::init(&config.observability.log_level);
    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        origin = %config.listener.origin,
        backend = ?config.cache.backend,
        cluster_mode = config.cache.cluster_mode,
        cache_ttl_secs = config.cache.default_ttl_secs,
        "caching-proxy v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = CacheStore::connect(&config.cache).await?;

    let balancer = if config.load_balancer.enabled {
        let lb = LoadBalancer::from_config(&config.load_balancer);
        for server in lb.servers() {
            metrics::record_backend_health(server.name(), server.is_healthy());
        }
        Some(Arc::new(lb))
    } else {
        None
    };

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(&config, store, balancer)?;

    if config.admin.enabled {
        let admin = setup_admin_router(server.state().clone(), &config.admin.api_key);
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");

        let admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(admin_listener, admin)
                .with_graceful_shutdown(shutdown::wait(admin_shutdown))
                .await
            {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(ExitCode::SUCCESS)
}

async fn clear_cache(args: StoreArgs) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let store = connect_store(&args).await?;
    println!("Clearing cache...");

    if store.clear_all().await {
        println!("✓ Cache cleared successfully");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("✗ Error clearing cache");
        Ok(ExitCode::FAILURE)
    }
}

async fn stats(args: StoreArgs) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let store = connect_store(&args).await?;
    let stats = store.stats().await;

    println!("\n=== Cache Statistics ===");
    println!("Total cached entries: {}", stats.total_keys);
    println!("Cluster mode: {}", stats.cluster_mode);
    if let Some(error) = stats.error {
        println!("Warning: {}", error);
    }
    Ok(ExitCode::SUCCESS)
}
