/// Health check endpoint
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "redis": "disabled"
/// }
/// ```
///
/// `status` is `degraded` when the database is unreachable or Redis is
/// configured but not answering. The endpoint itself always returns 200 so
/// load balancers can tell a slow dependency from a dead process.

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use mockmate_shared::db::pool::{self, PoolStats};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,

    /// `connected` or `disconnected`
    pub database: &'static str,

    /// `connected`, `disconnected` or `disabled`
    pub redis: &'static str,

    pub pool: PoolStats,
    pub websocket_connections: usize,
}

pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let database = match pool::health_check(&state.db).await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            "disconnected"
        }
    };

    let redis = match &state.redis {
        None => "disabled",
        Some(client) => match client.ping().await {
            Ok(true) => "connected",
            _ => "disconnected",
        },
    };

    let healthy = database == "connected" && redis != "disconnected";

    Ok(Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database,
        redis,
        pool: pool::get_pool_stats(&state.db),
        websocket_connections: state.hub.stats().connections,
    }))
}
