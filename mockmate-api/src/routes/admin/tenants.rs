use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{Page, Pagination, ValidJson},
    middleware::auth::CurrentUser,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use mockmate_shared::{
    models::{
        activity_log::{ActivityLog, NewActivity},
        tenant::{CreateTenant, Tenant, TenantPlan, TenantStatus, UpdateTenant},
        tenant_api_key::TenantApiKey,
        tenant_user::{TenantMember, TenantRole, TenantUser},
        user::User,
    },
    quota::QuotaCheckResult,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct AdminCreateTenantRequest {
    #[validate(length(min = 2, max = 200, message = "Name must be 2-200 characters"))]
    pub name: String,

    #[validate(length(min = 2, max = 100, message = "Slug must be 2-100 characters"))]
    pub slug: Option<String>,

    #[serde(default = "default_plan")]
    pub plan: TenantPlan,

    pub settings: Option<JsonValue>,

    /// Existing account made owner of the new tenant
    #[validate(email(message = "Invalid email address"))]
    pub owner_email: Option<String>,
}

fn default_plan() -> TenantPlan {
    TenantPlan::Trial
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdminUpdateTenantRequest {
    #[validate(length(min = 2, max = 200, message = "Name must be 2-200 characters"))]
    pub name: Option<String>,
    pub plan: Option<TenantPlan>,
    pub status: Option<TenantStatus>,
    pub settings: Option<JsonValue>,
}

#[derive(Debug, Serialize)]
pub struct AdminTenantDetail {
    #[serde(flatten)]
    pub tenant: Tenant,
    pub usage: Vec<QuotaCheckResult>,
}

pub async fn list(State(state): State<AppState>, Query(pagination): Query<Pagination>) -> ApiResult<Json<Page<Tenant>>> {
    let items = Tenant::list(&state.db, pagination.limit(), pagination.offset()).await?;
    let total = Tenant::count(&state.db).await?;

    Ok(Json(pagination.wrap(items, total)))
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    ValidJson(req): ValidJson<AdminCreateTenantRequest>,
) -> ApiResult<(StatusCode, Json<Tenant>)> {
    let owner = match req.owner_email.as_deref() {
        Some(email) => Some(
            User::find_by_email(&state.db, email)
                .await?
                .ok_or_else(|| ApiError::invalid_field("owner_email", "No account with that email"))?,
        ),
        None => None,
    };

    let mut tx = state.db.begin().await?;
    let tenant = Tenant::create(
        &mut *tx,
        CreateTenant {
            name: req.name.trim().to_string(),
            slug: req.slug,
            plan: req.plan,
            settings: req.settings,
        },
    )
    .await?;
    if let Some(owner) = &owner {
        TenantUser::add(&mut *tx, tenant.id, owner.id, TenantRole::Owner).await?;
    }
    tx.commit().await?;

    tracing::info!(admin_id = %admin.id, tenant_id = %tenant.id, plan = %tenant.plan, "Tenant created by admin");
    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(admin.id), "admin.tenant_created")
            .entity("tenant", tenant.id)
            .metadata(json!({ "owner_id": owner.map(|o| o.id) })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(tenant)))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<AdminTenantDetail>> {
    let tenant = Tenant::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tenant not found"))?;
    let usage = state.quotas.summary(id).await?;

    Ok(Json(AdminTenantDetail { tenant, usage }))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<AdminUpdateTenantRequest>,
) -> ApiResult<Json<Tenant>> {
    let tenant = Tenant::update(
        &state.db,
        id,
        UpdateTenant {
            name: req.name.map(|n| n.trim().to_string()),
            plan: req.plan,
            status: req.status,
            settings: req.settings,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Tenant not found"))?;

    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(admin.id), "admin.tenant_updated")
            .entity("tenant", id)
            .metadata(json!({ "plan": req.plan, "status": req.status })),
    )
    .await;

    Ok(Json(tenant))
}

/// Deletes the tenant with its memberships and API keys; sessions booked
/// under it stay with their users
pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !Tenant::delete(&state.db, id).await? {
        return Err(ApiError::not_found("Tenant not found"));
    }

    tracing::warn!(admin_id = %admin.id, tenant_id = %id, "Tenant deleted");
    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(admin.id), "admin.tenant_deleted").entity("tenant", id),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn users(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Vec<TenantMember>>> {
    Ok(Json(TenantUser::list_members(&state.db, id).await?))
}

pub async fn api_keys(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Vec<TenantApiKey>>> {
    Ok(Json(TenantApiKey::list_by_tenant(&state.db, id).await?))
}
