/// Alert administration
///
/// `POST /admin/alerts` targets exactly one audience: a single user
/// (`user_id`), every member of a tenant (`tenant_id`), or every active
/// user (neither). Each recipient gets their own row, pushed live over the
/// `alerts_<id>` room and optionally emailed.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{Pagination, ValidJson},
    middleware::auth::CurrentUser,
    routes::alerts::{announce_read, deliver},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use mockmate_shared::models::{
    activity_log::{ActivityLog, NewActivity},
    alert::{Alert, AlertAudience, AlertSeverity, BroadcastAlert, CreateAlert},
    user::User,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize)]
pub struct AdminAlertQuery {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAlertRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    #[validate(length(min = 1, max = 5000, message = "Message must be 1-5000 characters"))]
    pub message: String,

    #[serde(default)]
    pub severity: AlertSeverity,

    #[validate(length(min = 1, max = 50, message = "Alert type must be 1-50 characters"))]
    pub alert_type: Option<String>,

    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,

    /// Also email every recipient
    #[serde(default)]
    pub send_email: bool,
}

#[derive(Debug, Serialize)]
pub struct CreateAlertResponse {
    pub recipients: usize,
    pub alerts: Vec<Alert>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(query): Query<AdminAlertQuery>,
) -> ApiResult<Json<Vec<Alert>>> {
    Ok(Json(
        Alert::list_all(&state.db, query.user_id, pagination.limit(), pagination.offset()).await?,
    ))
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    ValidJson(req): ValidJson<CreateAlertRequest>,
) -> ApiResult<(StatusCode, Json<CreateAlertResponse>)> {
    if req.user_id.is_some() && req.tenant_id.is_some() {
        return Err(ApiError::invalid_field("user_id", "Give either user_id or tenant_id, not both"));
    }
    if req.expires_at.is_some_and(|at| at <= Utc::now()) {
        return Err(ApiError::invalid_field("expires_at", "Expiry must be in the future"));
    }

    let alert_type = req.alert_type.unwrap_or_else(|| "system".to_string());

    let alerts = match req.user_id {
        Some(user_id) => {
            if User::find_by_id(&state.db, user_id).await?.is_none() {
                return Err(ApiError::not_found("User not found"));
            }

            let mut data = CreateAlert::new(user_id, req.title, req.message)
                .severity(req.severity)
                .alert_type(alert_type);
            data.created_by = Some(admin.id);
            data.expires_at = req.expires_at;

            vec![Alert::create(&state.db, data).await?]
        }
        None => {
            let audience = match req.tenant_id {
                Some(tenant_id) => AlertAudience::Tenant(tenant_id),
                None => AlertAudience::AllUsers,
            };

            Alert::broadcast(
                &state.db,
                audience,
                BroadcastAlert {
                    title: req.title,
                    message: req.message,
                    severity: req.severity,
                    alert_type,
                    created_by: Some(admin.id),
                    expires_at: req.expires_at,
                },
            )
            .await?
        }
    };

    deliver(&state, &alerts, req.send_email).await?;

    tracing::info!(admin_id = %admin.id, recipients = alerts.len(), email = req.send_email, "Alert sent");
    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(admin.id), "admin.alert_sent").metadata(json!({
            "recipients": alerts.len(),
            "user_id": req.user_id,
            "tenant_id": req.tenant_id,
        })),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(CreateAlertResponse {
            recipients: alerts.len(),
            alerts,
        }),
    ))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    let alert = Alert::delete(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Alert not found"))?;

    announce_read(&state, alert.user_id, Some(alert.id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
