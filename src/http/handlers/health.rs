use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::analytics::{self, GatewayStats};
use crate::gateway::PoolStats;
use crate::http::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub connections: usize,
    pub pools: Vec<PoolStats>,
    pub stats: GatewayStats,
}

/// `GET /health`: liveness plus a few counters.
pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok",
        connections: state.registry.len(),
        pools: state.pools.snapshot(),
        stats: analytics::snapshot(),
    })
}
