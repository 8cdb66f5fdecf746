/// Resume endpoints
///
/// Clients extract text from the uploaded document and send it as JSON; the
/// interviewer reads `content_text` when a session references the resume.
///
/// - `POST /api/resumes` - Store a resume (the first one becomes primary)
/// - `GET /api/resumes` - List own resumes, primary first
/// - `GET /api/resumes/:id`
/// - `DELETE /api/resumes/:id`
/// - `PUT /api/resumes/:id/primary`

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
use mockmate_shared::models::user_resume::{CreateResume, UserResume};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

pub const ACCEPTED_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
    "text/markdown",
];

#[derive(Debug, Deserialize, Validate)]
pub struct UploadResumeRequest {
    #[validate(length(min = 1, max = 255, message = "File name must be 1-255 characters"))]
    pub file_name: String,

    pub content_type: Option<String>,

    #[validate(length(min = 1, max = 100000, message = "Resume text must be 1-100000 characters"))]
    pub content_text: String,

    #[serde(default)]
    pub is_primary: bool,
}

pub async fn upload(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidJson(req): ValidJson<UploadResumeRequest>,
) -> ApiResult<(StatusCode, Json<UserResume>)> {
    let content_type = req.content_type.unwrap_or_else(|| "text/plain".to_string());
    if !ACCEPTED_CONTENT_TYPES.contains(&content_type.as_str()) {
        return Err(ApiError::invalid_field("content_type", "Unsupported document type"));
    }

    let resume = UserResume::create(
        &state.db,
        CreateResume {
            user_id: user.id,
            file_name: req.file_name,
            content_type,
            content_text: req.content_text,
            is_primary: req.is_primary,
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, resume_id = %resume.id, size = resume.file_size, "Resume stored");
    Ok((StatusCode::CREATED, Json(resume)))
}

pub async fn list(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Json<Vec<UserResume>>> {
    Ok(Json(UserResume::list_for_user(&state.db, user.id).await?))
}

pub async fn get(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserResume>> {
    UserResume::find_for_user(&state.db, id, user.id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Resume not found"))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !UserResume::delete_for_user(&state.db, id, user.id).await? {
        return Err(ApiError::not_found("Resume not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_primary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserResume>> {
    UserResume::set_primary(&state.db, id, user.id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Resume not found"))
}
