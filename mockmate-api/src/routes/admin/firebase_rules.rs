/// Firebase security-rules templates
///
/// A template is rules source with `{{ placeholders }}`. Rendering merges,
/// lowest priority first: the template's own `variables`, the tenant's
/// `settings.firebase` object, the tenant identity (`tenant_id`,
/// `tenant_slug`, `tenant_name`), then the request's `variables`. Any
/// placeholder left without a value fails the render.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ValidJson,
    middleware::auth::CurrentUser,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use mockmate_shared::models::{
    activity_log::{ActivityLog, NewActivity},
    firebase_rules_template::{CreateRulesTemplate, FirebaseRulesTemplate, UpdateRulesTemplate},
    tenant::Tenant,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRulesRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    pub description: Option<String>,

    #[validate(length(min = 1, message = "Template is required"))]
    pub template: String,

    pub variables: Option<JsonValue>,

    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct RenderRequest {
    pub tenant_id: Option<Uuid>,

    #[serde(default)]
    pub variables: JsonValue,
}

#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub template_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub rules: String,
}

fn ensure_object(field: &str, value: Option<&JsonValue>) -> ApiResult<()> {
    match value {
        None | Some(JsonValue::Object(_)) => Ok(()),
        Some(_) => Err(ApiError::invalid_field(field, "Must be a JSON object")),
    }
}

async fn load(state: &AppState, id: Uuid) -> ApiResult<FirebaseRulesTemplate> {
    FirebaseRulesTemplate::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Rules template not found"))
}

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<FirebaseRulesTemplate>>> {
    Ok(Json(FirebaseRulesTemplate::list(&state.db).await?))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<FirebaseRulesTemplate>> {
    Ok(Json(load(&state, id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    ValidJson(req): ValidJson<CreateRulesRequest>,
) -> ApiResult<(StatusCode, Json<FirebaseRulesTemplate>)> {
    ensure_object("variables", req.variables.as_ref())?;

    let template = FirebaseRulesTemplate::create(
        &state.db,
        CreateRulesTemplate {
            name: req.name,
            description: req.description,
            template: req.template,
            variables: req.variables,
            is_default: req.is_default,
        },
    )
    .await?;

    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(admin.id), "admin.firebase_rules_created").entity("firebase_rules_template", template.id),
    )
    .await;

    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRulesTemplate>,
) -> ApiResult<Json<FirebaseRulesTemplate>> {
    ensure_object("variables", req.variables.as_ref())?;
    if req.template.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::invalid_field("template", "Template is required"));
    }

    let template = FirebaseRulesTemplate::update(&state.db, id, req)
        .await?
        .ok_or_else(|| ApiError::not_found("Rules template not found"))?;

    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(admin.id), "admin.firebase_rules_updated").entity("firebase_rules_template", id),
    )
    .await;

    Ok(Json(template))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !FirebaseRulesTemplate::delete(&state.db, id).await? {
        return Err(ApiError::not_found("Rules template not found"));
    }

    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(admin.id), "admin.firebase_rules_deleted").entity("firebase_rules_template", id),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Renders the template, optionally for a tenant
///
/// # Errors
///
/// - `400 TEMPLATE_ERROR`: syntax error or a placeholder without a value
/// - `404 NOT_FOUND`: unknown template or tenant
pub async fn render(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<RenderRequest>>,
) -> ApiResult<Json<RenderResponse>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let template = load(&state, id).await?;

    let tenant = match req.tenant_id {
        Some(tenant_id) => Some(
            Tenant::find_by_id(&state.db, tenant_id)
                .await?
                .ok_or_else(|| ApiError::not_found("Tenant not found"))?,
        ),
        None => None,
    };

    let rules = template.render_for(tenant.as_ref(), &req.variables)?;

    Ok(Json(RenderResponse {
        template_id: template.id,
        tenant_id: req.tenant_id,
        rules,
    }))
}
