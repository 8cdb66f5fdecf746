/// User administration
///
/// - `GET /admin/users?search=&role=&status=&page=`
/// - `GET|PUT|DELETE /admin/users/:id`
/// - `POST /admin/users/:id/credits` - Grant or claw back credits
/// - `POST /admin/users/:id/purge` - Remove the user's data, keep the account
///
/// Admins cannot demote, suspend, or delete themselves.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{Page, Pagination, ValidJson},
    middleware::auth::CurrentUser,
    ws::events::ServerEvent,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use mockmate_shared::models::{
    activity_log::{ActivityLog, NewActivity},
    credit_transaction::{CreditKind, CreditTransaction},
    tenant_user::{TenantUser, UserTenant},
    user::{PurgeSummary, UpdateUser, User, UserFilter, UserRole, UserStatus},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub search: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
}

#[derive(Debug, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub tenants: Vec<UserTenant>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdminUpdateUserRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    #[validate(length(min = 7, max = 20, message = "Phone must be 7-20 characters"))]
    pub phone: Option<String>,

    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    pub email_verified: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdjustCreditsRequest {
    /// Positive grants, negative deducts
    #[validate(range(min = -100000, max = 100000, message = "Amount must be within ±100000"))]
    pub amount: i32,

    #[validate(length(min = 1, max = 500, message = "Reason is required"))]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct AdjustCreditsResponse {
    pub transaction: CreditTransaction,
    pub balance: i32,
}

fn ensure_not_self(admin: &User, target: Uuid, action: &str) -> ApiResult<()> {
    if admin.id == target {
        return Err(ApiError::bad_request(
            "INVALID_OPERATION",
            format!("You cannot {} your own account", action),
        ));
    }
    Ok(())
}

pub async fn list(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Page<User>>> {
    let filter = UserFilter {
        search: query.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        role: query.role,
        status: query.status,
    };

    let items = User::list(&state.db, &filter, pagination.limit(), pagination.offset()).await?;
    let total = User::count(&state.db, &filter).await?;

    Ok(Json(pagination.wrap(items, total)))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<UserDetail>> {
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let tenants = TenantUser::list_for_user(&state.db, id).await?;

    Ok(Json(UserDetail { user, tenants }))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<AdminUpdateUserRequest>,
) -> ApiResult<Json<User>> {
    if req.role == Some(UserRole::User) {
        ensure_not_self(&admin, id, "demote")?;
    }
    if req.status == Some(UserStatus::Suspended) {
        ensure_not_self(&admin, id, "suspend")?;
    }

    let changes = json!({
        "role": req.role,
        "status": req.status,
        "email_verified": req.email_verified,
    });

    let user = User::update(
        &state.db,
        id,
        UpdateUser {
            name: req.name,
            phone: req.phone,
            avatar_url: None,
            role: req.role,
            status: req.status,
            email_verified: req.email_verified,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    tracing::info!(admin_id = %admin.id, user_id = %id, "User updated by admin");
    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(admin.id), "admin.user_updated")
            .entity("user", id)
            .metadata(changes),
    )
    .await;

    Ok(Json(user))
}

/// Writes an `admin_adjustment` ledger entry
///
/// # Errors
///
/// - `400 INSUFFICIENT_CREDITS`: a deduction would leave a negative balance
pub async fn adjust_credits(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<AdjustCreditsRequest>,
) -> ApiResult<Json<AdjustCreditsResponse>> {
    if req.amount == 0 {
        return Err(ApiError::invalid_field("amount", "Amount must not be zero"));
    }

    let transaction = CreditTransaction::apply_standalone(
        &state.db,
        id,
        req.amount,
        CreditKind::AdminAdjustment,
        None,
        Some(req.reason.trim()),
    )
    .await?;
    let balance = transaction.balance_after;

    state.hub.emit_to_user(id, ServerEvent::CreditsUpdated { balance });

    tracing::info!(admin_id = %admin.id, user_id = %id, amount = req.amount, balance, "Credits adjusted");
    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(admin.id), "admin.credits_adjusted")
            .entity("user", id)
            .metadata(json!({ "amount": req.amount, "reason": req.reason, "balance": balance })),
    )
    .await;

    Ok(Json(AdjustCreditsResponse { transaction, balance }))
}

/// Deletes sessions, resumes, alerts and tokens; the account stays
pub async fn purge(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PurgeSummary>> {
    let summary = User::purge_data(&state.db, id, false)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    tracing::warn!(admin_id = %admin.id, user_id = %id, sessions = summary.sessions, "User data purged");
    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(admin.id), "admin.user_purged")
            .entity("user", id)
            .metadata(json!(summary)),
    )
    .await;

    Ok(Json(summary))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    ensure_not_self(&admin, id, "delete")?;

    let summary = User::purge_data(&state.db, id, true)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    tracing::warn!(admin_id = %admin.id, user_id = %id, "User deleted");
    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(admin.id), "admin.user_deleted")
            .entity("user", id)
            .metadata(json!(summary)),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_amount_passes_range_but_not_handler() {
        let req = AdjustCreditsRequest {
            amount: 0,
            reason: "test".into(),
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_amount_bounds() {
        let req = AdjustCreditsRequest {
            amount: 200_000,
            reason: "bulk".into(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_user_query_parses_enums() {
        let q: UserQuery = serde_json::from_str(r#"{"role":"admin","status":"suspended"}"#).unwrap();
        assert_eq!(q.role, Some(UserRole::Admin));
        assert_eq!(q.status, Some(UserStatus::Suspended));
    }
}
