/// Tenant (organization) endpoints
///
/// Reachable with a user JWT or a tenant API key (`X-Api-Key`). API keys
/// only ever see their own tenant and can only read; membership and key
/// management need a user with the right tenant role.
///
/// # Endpoints
///
/// - `GET /api/tenant` / `POST /api/tenant` - Caller's tenants / create one
/// - `GET|PUT /api/tenant/:tenant_id`
/// - `GET /api/tenant/:tenant_id/usage` - Quota usage for the plan
/// - `GET /api/tenant/:tenant_id/sessions` - Sessions booked under the tenant
/// - `GET|POST /api/tenant/:tenant_id/users`
/// - `PUT|DELETE /api/tenant/:tenant_id/users/:user_id`
/// - `GET|POST /api/tenant/:tenant_id/api-keys`
/// - `DELETE /api/tenant/:tenant_id/api-keys/:key_id`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{Page, Pagination, ValidJson},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use mockmate_shared::{
    auth::{
        api_key::validate_scopes,
        authorization::{require_scope, require_tenant_role},
        middleware::{AuthContext, AuthMethod},
    },
    models::{
        activity_log::{ActivityLog, NewActivity},
        interview_session::{InterviewSession, SessionFilter},
        tenant::{CreateTenant, Tenant, TenantPlan, UpdateTenant},
        tenant_api_key::{CreateTenantApiKey, TenantApiKey},
        tenant_user::{TenantMember, TenantRole, TenantUser, UserTenant},
        user::User,
    },
    quota::{QuotaCheckResult, QuotaLimits, QuotaType},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTenantRequest {
    #[validate(length(min = 2, max = 200, message = "Name must be 2-200 characters"))]
    pub name: String,

    #[validate(length(min = 2, max = 100, message = "Slug must be 2-100 characters"))]
    pub slug: Option<String>,

    pub settings: Option<JsonValue>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTenantRequest {
    #[validate(length(min = 2, max = 200, message = "Name must be 2-200 characters"))]
    pub name: Option<String>,

    pub settings: Option<JsonValue>,
}

#[derive(Debug, Serialize)]
pub struct TenantDetail {
    #[serde(flatten)]
    pub tenant: Tenant,

    /// Caller's role; absent for API keys and platform admins outside the tenant
    pub role: Option<TenantRole>,

    pub limits: QuotaLimits,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub tenant_id: Uuid,
    pub plan: String,
    pub quotas: Vec<QuotaCheckResult>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddMemberRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[serde(default = "default_member_role")]
    pub role: TenantRole,
}

fn default_member_role() -> TenantRole {
    TenantRole::Member
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMemberRequest {
    pub role: TenantRole,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateApiKeyRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(length(min = 1, message = "At least one scope is required"))]
    pub scopes: Vec<String>,

    /// Days until the key stops working; never expires when omitted
    #[validate(range(min = 1, max = 3650, message = "Expiry must be 1-3650 days"))]
    pub expires_in_days: Option<i64>,
}

/// Returned once, on creation
#[derive(Debug, Serialize)]
pub struct CreateApiKeyResponse {
    #[serde(flatten)]
    pub api_key: TenantApiKey,

    /// Plaintext key. It cannot be retrieved again.
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct RevokeApiKeyResponse {
    pub revoked: bool,
}

/// The acting user's role, or `None` for API keys and outside admins
async fn caller_role(state: &AppState, auth: &AuthContext, tenant_id: Uuid) -> ApiResult<Option<TenantRole>> {
    match (auth.method, auth.user_id) {
        (AuthMethod::Jwt, Some(user_id)) => Ok(TenantUser::get_role(&state.db, tenant_id, user_id).await?),
        _ => Ok(None),
    }
}

async fn load_tenant(state: &AppState, tenant_id: Uuid) -> ApiResult<Tenant> {
    Tenant::find_by_id(&state.db, tenant_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tenant not found"))
}

/// A role may only hand out roles up to its own level
fn ensure_can_grant(auth: &AuthContext, actor: Option<TenantRole>, granted: TenantRole) -> ApiResult<()> {
    if auth.is_admin() {
        return Ok(());
    }
    match actor {
        Some(actor) if actor.has_permission(&granted) => Ok(()),
        _ => Err(ApiError::forbidden(
            "FORBIDDEN",
            format!("You cannot grant the {} role", granted.as_str()),
        )),
    }
}

async fn ensure_not_last_owner(state: &AppState, tenant_id: Uuid, user_id: Uuid) -> ApiResult<()> {
    let role = TenantUser::get_role(&state.db, tenant_id, user_id).await?;
    if role == Some(TenantRole::Owner) && TenantUser::count_owners(&state.db, tenant_id).await? <= 1 {
        return Err(ApiError::bad_request(
            "LAST_OWNER",
            "A tenant must keep at least one owner",
        ));
    }
    Ok(())
}

pub async fn list_mine(State(state): State<AppState>, auth: AuthContext) -> ApiResult<Json<Vec<UserTenant>>> {
    let user_id = auth.require_user()?;
    Ok(Json(TenantUser::list_for_user(&state.db, user_id).await?))
}

/// Creates a tenant on the trial plan with the caller as owner
pub async fn create(
    State(state): State<AppState>,
    auth: AuthContext,
    ValidJson(req): ValidJson<CreateTenantRequest>,
) -> ApiResult<(StatusCode, Json<TenantDetail>)> {
    let user_id = auth.require_user()?;

    let mut tx = state.db.begin().await?;
    let tenant = Tenant::create(
        &mut *tx,
        CreateTenant {
            name: req.name.trim().to_string(),
            slug: req.slug,
            plan: TenantPlan::Trial,
            settings: req.settings,
        },
    )
    .await?;
    TenantUser::add(&mut *tx, tenant.id, user_id, TenantRole::Owner).await?;
    tx.commit().await?;

    tracing::info!(tenant_id = %tenant.id, slug = %tenant.slug, %user_id, "Tenant created");
    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(user_id), "tenant.created").entity("tenant", tenant.id),
    )
    .await;

    let limits = QuotaLimits::for_plan(tenant.get_plan());
    Ok((
        StatusCode::CREATED,
        Json(TenantDetail {
            tenant,
            role: Some(TenantRole::Owner),
            limits,
        }),
    ))
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<TenantDetail>> {
    require_tenant_role(&state.db, &auth, tenant_id, TenantRole::Viewer).await?;

    let tenant = load_tenant(&state, tenant_id).await?;
    let role = caller_role(&state, &auth, tenant_id).await?;
    let limits = QuotaLimits::for_plan(tenant.get_plan());

    Ok(Json(TenantDetail { tenant, role, limits }))
}

/// Renames the tenant or replaces its settings; plan and status are
/// platform-admin only
pub async fn update(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(tenant_id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdateTenantRequest>,
) -> ApiResult<Json<TenantDetail>> {
    let user_id = auth.require_user()?;
    require_tenant_role(&state.db, &auth, tenant_id, TenantRole::Admin).await?;

    let tenant = Tenant::update(
        &state.db,
        tenant_id,
        UpdateTenant {
            name: req.name.map(|n| n.trim().to_string()),
            settings: req.settings,
            ..Default::default()
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Tenant not found"))?;

    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(user_id), "tenant.updated").entity("tenant", tenant.id),
    )
    .await;

    let role = caller_role(&state, &auth, tenant_id).await?;
    let limits = QuotaLimits::for_plan(tenant.get_plan());
    Ok(Json(TenantDetail { tenant, role, limits }))
}

pub async fn usage(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<UsageResponse>> {
    require_tenant_role(&state.db, &auth, tenant_id, TenantRole::Viewer).await?;
    if auth.method == AuthMethod::ApiKey {
        require_scope(&auth, "analytics:read")?;
    }

    let tenant = load_tenant(&state, tenant_id).await?;
    let quotas = state.quotas.summary(tenant_id).await?;

    Ok(Json(UsageResponse {
        tenant_id,
        plan: tenant.plan,
        quotas,
    }))
}

pub async fn sessions(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(tenant_id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
    Query(query): Query<super::sessions::StatusQuery>,
) -> ApiResult<Json<Page<InterviewSession>>> {
    require_tenant_role(&state.db, &auth, tenant_id, TenantRole::Viewer).await?;
    if auth.method == AuthMethod::ApiKey {
        require_scope(&auth, "sessions:read")?;
    }

    let filter = SessionFilter {
        tenant_id: Some(tenant_id),
        status: super::sessions::parse_status(query.status.as_deref())?,
        ..Default::default()
    };

    let items = InterviewSession::list(&state.db, &filter, pagination.limit(), pagination.offset()).await?;
    let total = InterviewSession::count(&state.db, &filter).await?;

    Ok(Json(pagination.wrap(items, total)))
}

pub async fn list_members(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TenantMember>>> {
    require_tenant_role(&state.db, &auth, tenant_id, TenantRole::Viewer).await?;
    if auth.method == AuthMethod::ApiKey {
        require_scope(&auth, "users:read")?;
    }

    Ok(Json(TenantUser::list_members(&state.db, tenant_id).await?))
}

/// Adds an existing account to the tenant
///
/// # Errors
///
/// - `404 NOT_FOUND`: no account with that email
/// - `403 QUOTA_EXCEEDED`: plan's member limit reached
/// - `409 CONFLICT`: already a member
pub async fn add_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(tenant_id): Path<Uuid>,
    ValidJson(req): ValidJson<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<TenantMember>)> {
    let actor_id = auth.require_user()?;
    require_tenant_role(&state.db, &auth, tenant_id, TenantRole::Admin).await?;
    ensure_can_grant(&auth, caller_role(&state, &auth, tenant_id).await?, req.role)?;

    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(|| ApiError::not_found("No account with that email"))?;

    if TenantUser::get_role(&state.db, tenant_id, user.id).await?.is_some() {
        return Err(ApiError::Conflict("User is already a member of this tenant".to_string()));
    }

    state.quotas.enforce(tenant_id, QuotaType::Members).await?;
    let membership = TenantUser::add(&state.db, tenant_id, user.id, req.role).await?;

    tracing::info!(%tenant_id, user_id = %user.id, role = membership.role.as_str(), "Member added");
    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(actor_id), "tenant.member_added")
            .entity("tenant", tenant_id)
            .metadata(json!({ "user_id": user.id, "role": membership.role })),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(TenantMember {
            user_id: user.id,
            email: user.email,
            name: user.name,
            role: membership.role,
            created_at: membership.created_at,
        }),
    ))
}

pub async fn update_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((tenant_id, user_id)): Path<(Uuid, Uuid)>,
    ValidJson(req): ValidJson<UpdateMemberRequest>,
) -> ApiResult<Json<TenantUser>> {
    let actor_id = auth.require_user()?;
    require_tenant_role(&state.db, &auth, tenant_id, TenantRole::Admin).await?;

    let actor_role = caller_role(&state, &auth, tenant_id).await?;
    ensure_can_grant(&auth, actor_role, req.role)?;

    // Nobody below owner may touch an owner
    let current = TenantUser::get_role(&state.db, tenant_id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Member not found"))?;
    ensure_can_grant(&auth, actor_role, current)?;

    if current == TenantRole::Owner && req.role != TenantRole::Owner {
        ensure_not_last_owner(&state, tenant_id, user_id).await?;
    }

    let membership = TenantUser::update_role(&state.db, tenant_id, user_id, req.role)
        .await?
        .ok_or_else(|| ApiError::not_found("Member not found"))?;

    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(actor_id), "tenant.member_updated")
            .entity("tenant", tenant_id)
            .metadata(json!({ "user_id": user_id, "from": current, "to": req.role })),
    )
    .await;

    Ok(Json(membership))
}

/// Removes a member; members may always remove themselves
pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((tenant_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let actor_id = auth.require_user()?;

    if actor_id != user_id {
        require_tenant_role(&state.db, &auth, tenant_id, TenantRole::Admin).await?;

        let target = TenantUser::get_role(&state.db, tenant_id, user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Member not found"))?;
        ensure_can_grant(&auth, caller_role(&state, &auth, tenant_id).await?, target)?;
    }

    ensure_not_last_owner(&state, tenant_id, user_id).await?;

    if !TenantUser::remove(&state.db, tenant_id, user_id).await? {
        return Err(ApiError::not_found("Member not found"));
    }

    tracing::info!(%tenant_id, %user_id, "Member removed");
    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(actor_id), "tenant.member_removed")
            .entity("tenant", tenant_id)
            .metadata(json!({ "user_id": user_id })),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_api_keys(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TenantApiKey>>> {
    auth.require_user()?;
    require_tenant_role(&state.db, &auth, tenant_id, TenantRole::Admin).await?;

    Ok(Json(TenantApiKey::list_by_tenant(&state.db, tenant_id).await?))
}

/// Issues a tenant API key
///
/// ```text
/// POST /api/tenant/:tenant_id/api-keys
/// Authorization: Bearer <jwt>
///
/// {"name": "ATS sync", "scopes": ["sessions:read"], "expires_in_days": 90}
/// ```
///
/// The response carries the plaintext `key`; only its hash is stored.
pub async fn create_api_key(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(tenant_id): Path<Uuid>,
    ValidJson(req): ValidJson<CreateApiKeyRequest>,
) -> ApiResult<(StatusCode, Json<CreateApiKeyResponse>)> {
    let user_id = auth.require_user()?;
    require_tenant_role(&state.db, &auth, tenant_id, TenantRole::Admin).await?;

    validate_scopes(&req.scopes).map_err(|msg| ApiError::invalid_field("scopes", msg))?;
    state.quotas.enforce(tenant_id, QuotaType::ApiKeys).await?;

    let expires_at: Option<DateTime<Utc>> = req.expires_in_days.map(|days| Utc::now() + Duration::days(days));

    let (api_key, key) = TenantApiKey::create(
        &state.db,
        CreateTenantApiKey {
            tenant_id,
            name: req.name.trim().to_string(),
            scopes: req.scopes,
            created_by: Some(user_id),
            expires_at,
        },
    )
    .await?;

    tracing::info!(%tenant_id, api_key_id = %api_key.id, prefix = %api_key.key_prefix, "API key created");
    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(user_id), "tenant.api_key_created")
            .entity("tenant_api_key", api_key.id)
            .metadata(json!({ "tenant_id": tenant_id, "scopes": api_key.scopes })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(CreateApiKeyResponse { api_key, key })))
}

pub async fn revoke_api_key(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((tenant_id, key_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<RevokeApiKeyResponse>> {
    let user_id = auth.require_user()?;
    require_tenant_role(&state.db, &auth, tenant_id, TenantRole::Admin).await?;

    if !TenantApiKey::revoke(&state.db, key_id, tenant_id).await? {
        return Err(ApiError::not_found("API key not found"));
    }

    tracing::info!(%tenant_id, api_key_id = %key_id, "API key revoked");
    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(user_id), "tenant.api_key_revoked").entity("tenant_api_key", key_id),
    )
    .await;

    Ok(Json(RevokeApiKeyResponse { revoked: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockmate_shared::models::user::UserRole;

    fn jwt_ctx(role: UserRole) -> AuthContext {
        AuthContext {
            user_id: Some(Uuid::new_v4()),
            role: Some(role),
            tenant_id: None,
            method: AuthMethod::Jwt,
            scopes: None,
            api_key_id: None,
        }
    }

    #[test]
    fn test_admin_cannot_grant_owner() {
        let ctx = jwt_ctx(UserRole::User);
        assert!(ensure_can_grant(&ctx, Some(TenantRole::Admin), TenantRole::Member).is_ok());
        assert!(ensure_can_grant(&ctx, Some(TenantRole::Admin), TenantRole::Admin).is_ok());
        assert!(ensure_can_grant(&ctx, Some(TenantRole::Admin), TenantRole::Owner).is_err());
        assert!(ensure_can_grant(&ctx, Some(TenantRole::Owner), TenantRole::Owner).is_ok());
    }

    #[test]
    fn test_platform_admin_grants_anything() {
        let ctx = jwt_ctx(UserRole::Admin);
        assert!(ensure_can_grant(&ctx, None, TenantRole::Owner).is_ok());
    }

    #[test]
    fn test_outsider_cannot_grant() {
        let ctx = jwt_ctx(UserRole::User);
        let err = ensure_can_grant(&ctx, None, TenantRole::Viewer).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_default_member_role() {
        let req: AddMemberRequest = serde_json::from_str(r#"{"email":"a@b.com"}"#).unwrap();
        assert_eq!(req.role, TenantRole::Member);
    }
}
