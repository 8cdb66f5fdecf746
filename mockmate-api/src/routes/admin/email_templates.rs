/// Email template overrides
///
/// Every email the application sends has a built-in template; a stored,
/// active row with the same key replaces it. Templates use minijinja syntax
/// (`{{ name }}`); HTML bodies are auto-escaped.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::auth::CurrentUser,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use mockmate_shared::{
    email::{templates, RenderedEmail},
    models::{
        activity_log::{ActivityLog, NewActivity},
        email_template::{EmailTemplate, UpsertEmailTemplate},
    },
    templating::{merge_vars, render, RenderMode},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Serialize)]
pub struct TemplateView {
    pub key: &'static str,
    pub variables: &'static [&'static str],
    pub builtin_subject: &'static str,

    /// Stored override, active or not
    #[serde(rename = "override")]
    pub stored: Option<EmailTemplate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub variables: JsonValue,
}

fn known_template(key: &str) -> ApiResult<&'static templates::BuiltinTemplate> {
    templates::builtin(key).ok_or_else(|| ApiError::not_found(format!("Unknown email template: {}", key)))
}

/// Placeholder values so previews render every variable visibly
fn sample_vars(variables: &[&str]) -> JsonValue {
    let map: Map<String, JsonValue> = variables
        .iter()
        .map(|v| (v.to_string(), JsonValue::String(format!("[{}]", v))))
        .collect();
    JsonValue::Object(map)
}

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<TemplateView>>> {
    let stored = EmailTemplate::list(&state.db).await?;

    let views = templates::all()
        .iter()
        .map(|builtin| TemplateView {
            key: builtin.key,
            variables: builtin.variables,
            builtin_subject: builtin.subject,
            stored: stored.iter().find(|t| t.template_key == builtin.key).cloned(),
        })
        .collect();

    Ok(Json(views))
}

/// Stores an override after checking that it renders
pub async fn upsert(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Path(key): Path<String>,
    Json(req): Json<UpsertEmailTemplate>,
) -> ApiResult<Json<EmailTemplate>> {
    let builtin = known_template(&key)?;

    if req.subject.trim().is_empty() || req.body_html.trim().is_empty() {
        return Err(ApiError::invalid_field("body_html", "Subject and HTML body are required"));
    }

    let vars = sample_vars(builtin.variables);
    render(&req.subject, &vars, RenderMode::Text)?;
    render(&req.body_html, &vars, RenderMode::Html)?;
    if let Some(text) = &req.body_text {
        render(text, &vars, RenderMode::Text)?;
    }

    let template = EmailTemplate::upsert(&state.db, &key, req).await?;

    tracing::info!(admin_id = %admin.id, template = %key, active = template.is_active, "Email template saved");
    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(admin.id), "admin.email_template_saved").entity("email_template", &key),
    )
    .await;

    Ok(Json(template))
}

/// Drops the override; the built-in template applies again
pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Path(key): Path<String>,
) -> ApiResult<StatusCode> {
    if !EmailTemplate::delete(&state.db, &key).await? {
        return Err(ApiError::not_found("No stored template for that key"));
    }

    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(admin.id), "admin.email_template_deleted").entity("email_template", &key),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Renders the template that would be sent right now
///
/// Request variables override the bracketed placeholders.
pub async fn preview(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Option<Json<PreviewRequest>>,
) -> ApiResult<Json<RenderedEmail>> {
    let builtin = known_template(&key)?;
    let overrides = body.map(|Json(b)| b.variables).unwrap_or(JsonValue::Null);

    let vars = merge_vars([&sample_vars(builtin.variables), &overrides]);
    Ok(Json(state.email.render(&key, &vars).await?))
}
