/// Login provider configuration
///
/// Rows are scoped globally (`tenant_id` omitted) or per tenant; a tenant
/// row overrides the global one for that tenant's login screen. Client
/// secrets are write-only.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::auth::CurrentUser,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use mockmate_shared::models::{
    activity_log::{ActivityLog, NewActivity},
    auth_provider_config::{AuthProvider, AuthProviderConfig, UpsertAuthProvider},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct ScopeQuery {
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ProviderView {
    pub provider: AuthProvider,

    /// Stored row at this scope, if any
    pub config: Option<AuthProviderConfig>,

    pub has_client_secret: bool,
    pub enabled_by_default: bool,
}

fn views(rows: Vec<AuthProviderConfig>) -> Vec<ProviderView> {
    AuthProvider::ALL
        .iter()
        .map(|provider| {
            let config = rows.iter().find(|r| r.provider == provider.as_str()).cloned();
            ProviderView {
                provider: *provider,
                has_client_secret: config.as_ref().is_some_and(|c| c.has_client_secret()),
                enabled_by_default: provider.enabled_by_default(),
                config,
            }
        })
        .collect()
}

/// Every known provider with its stored row at the requested scope
pub async fn list(State(state): State<AppState>, Query(scope): Query<ScopeQuery>) -> ApiResult<Json<Vec<ProviderView>>> {
    let rows = AuthProviderConfig::list(&state.db, scope.tenant_id).await?;
    Ok(Json(views(rows)))
}

pub async fn upsert(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Path(provider): Path<AuthProvider>,
    Query(scope): Query<ScopeQuery>,
    Json(req): Json<UpsertAuthProvider>,
) -> ApiResult<Json<AuthProviderConfig>> {
    if provider.is_oauth() && req.enabled && req.client_id.as_deref().map_or(true, str::is_empty) {
        return Err(ApiError::invalid_field("client_id", "OAuth providers need a client id"));
    }

    let row = AuthProviderConfig::upsert(&state.db, scope.tenant_id, provider, req).await?;

    tracing::info!(admin_id = %admin.id, provider = provider.as_str(), tenant_id = ?scope.tenant_id, enabled = row.enabled, "Auth provider configured");
    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(admin.id), "admin.auth_provider_updated")
            .entity("auth_provider_config", row.id)
            .metadata(json!({ "provider": provider, "tenant_id": scope.tenant_id, "enabled": row.enabled })),
    )
    .await;

    Ok(Json(row))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !AuthProviderConfig::delete(&state.db, id).await? {
        return Err(ApiError::not_found("Provider configuration not found"));
    }

    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(admin.id), "admin.auth_provider_deleted").entity("auth_provider_config", id),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
