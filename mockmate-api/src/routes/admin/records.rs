use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{Page, Pagination},
    routes::sessions::parse_status,
};
use axum::{
    extract::{Query, State},
    Json,
};
use mockmate_shared::models::{
    interview_session::{InterviewSession, SessionFilter},
    payment::{Payment, PaymentFilter, PaymentStatus},
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct RecordQuery {
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub status: Option<String>,
}

pub async fn sessions(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(query): Query<RecordQuery>,
) -> ApiResult<Json<Page<InterviewSession>>> {
    let filter = SessionFilter {
        user_id: query.user_id,
        tenant_id: query.tenant_id,
        status: parse_status(query.status.as_deref())?,
    };

    let items = InterviewSession::list(&state.db, &filter, pagination.limit(), pagination.offset()).await?;
    let total = InterviewSession::count(&state.db, &filter).await?;

    Ok(Json(pagination.wrap(items, total)))
}

pub async fn payments(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(query): Query<RecordQuery>,
) -> ApiResult<Json<Page<Payment>>> {
    let status = query
        .status
        .as_deref()
        .map(|s| PaymentStatus::parse(s).ok_or_else(|| ApiError::invalid_field("status", format!("Unknown status '{}'", s))))
        .transpose()?;

    let filter = PaymentFilter {
        user_id: query.user_id,
        status,
    };

    let items = Payment::list(&state.db, &filter, pagination.limit(), pagination.offset()).await?;
    let total = Payment::count(&state.db, &filter).await?;

    Ok(Json(pagination.wrap(items, total)))
}
