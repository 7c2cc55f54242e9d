use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::cache::CacheStats;
use crate::load_balancer::Server;
use crate::observability::StatsSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub load_balancing: bool,
    pub cluster_mode: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ServerStatus {
    pub name: String,
    pub weight: u32,
    pub effective_weight: i64,
    pub current_weight: i64,
    pub healthy: bool,
    pub active_connections: usize,
}

impl From<&Server> for ServerStatus {
    fn from(s: &Server) -> Self {
        Self {
            name: s.name().to_string(),
            weight: s.weight(),
            effective_weight: s.effective_weight(),
            current_weight: s.current_weight(),
            healthy: s.is_healthy(),
            active_connections: s.active_connections(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HealthUpdate {
    pub healthy: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChange {
    pub name: String,
    pub healthy: bool,
    pub previous: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResult {
    pub cleared: bool,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        load_balancing: state.proxy.balancer.is_some(),
        cluster_mode: state.proxy.store.is_cluster(),
    })
}

pub async fn get_stats(State(state): State<AdminState>) -> Json<StatsSnapshot> {
    Json(state.proxy.stats.snapshot())
}

pub async fn get_servers(State(state): State<AdminState>) -> Json<Vec<ServerStatus>> {
    let servers = match &state.proxy.balancer {
        Some(lb) => lb.servers().iter().map(|s| ServerStatus::from(&**s)).collect(),
        None => Vec::new(),
    };
    Json(servers)
}

pub async fn set_server_health(
    State(state): State<AdminState>,
    Path(name): Path<String>,
    Json(update): Json<HealthUpdate>,
) -> Result<Json<HealthChange>, StatusCode> {
    let lb = state.proxy.balancer.as_ref().ok_or(StatusCode::NOT_FOUND)?;
    let previous = lb
        .set_server_health(&name, update.healthy)
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(HealthChange {
        name,
        healthy: update.healthy,
        previous,
    }))
}

pub async fn get_cache(State(state): State<AdminState>) -> Json<CacheStats> {
    Json(state.proxy.store.stats().await)
}

pub async fn clear_cache(State(state): State<AdminState>) -> (StatusCode, Json<ClearResult>) {
    let cleared = state.proxy.store.clear_all().await;
    let status = if cleared {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ClearResult { cleared }))
}
