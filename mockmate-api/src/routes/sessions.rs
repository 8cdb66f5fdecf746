/// Interview session endpoints
///
/// # Endpoints
///
/// - `POST /api/sessions` - Create a session (debits credits)
/// - `GET /api/sessions` - List own sessions
/// - `GET /api/sessions/:id` - Session details
/// - `GET /api/sessions/:id/messages` - Chat transcript
/// - `POST /api/sessions/:id/messages` - Send a candidate message
/// - `POST /api/sessions/:id/start` - Start and receive the first question
/// - `POST /api/sessions/:id/complete` - Finish and get evaluated
/// - `POST /api/sessions/:id/cancel` - Cancel; unstarted sessions are refunded
///
/// Chat activity is mirrored to the `session_<id>` room so a browser tab
/// connected over WebSocket sees replies produced by either transport.

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
use mockmate_shared::{
    auth::{
        authorization::require_tenant_role,
        middleware::AuthContext,
    },
    interviewer::{InterviewContext, Turn},
    models::{
        activity_log::{ActivityLog, NewActivity},
        credit_transaction::{CreditError, CreditKind, CreditTransaction},
        interview_message::{InterviewMessage, MessageSender},
        interview_session::{CreateSession, Difficulty, InterviewSession, InterviewType, SessionFilter, SessionStatus},
        tenant_user::TenantRole,
        user_resume::UserResume,
    },
    quota::QuotaType,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,

    #[validate(length(min = 1, max = 120, message = "Job role must be 1-120 characters"))]
    pub job_role: String,

    /// `technical`, `behavioral`, `system_design` or `hr`
    pub interview_type: String,

    /// `easy`, `medium` or `hard`; defaults to `medium`
    pub difficulty: Option<String>,

    pub resume_id: Option<Uuid>,

    /// Count the session against a tenant the caller belongs to
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session: InterviewSession,
    pub balance: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PostMessageRequest {
    #[validate(length(min = 1, max = 4000, message = "Message must be 1-4000 characters"))]
    pub content: String,
}

/// The candidate's message and the interviewer's answer to it
#[derive(Debug, Serialize)]
pub struct Exchange {
    pub message: InterviewMessage,
    pub reply: InterviewMessage,
}

#[derive(Debug, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: InterviewSession,
    pub message_count: usize,
}

pub(crate) fn parse_status(raw: Option<&str>) -> ApiResult<Option<SessionStatus>> {
    raw.map(|s| SessionStatus::parse(s).ok_or_else(|| ApiError::invalid_field("status", format!("Unknown status '{}'", s))))
        .transpose()
}

/// Loads a session owned by the caller
pub(crate) async fn owned_session(state: &AppState, id: Uuid, user_id: Uuid) -> ApiResult<InterviewSession> {
    InterviewSession::find_for_user(&state.db, id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Session not found"))
}

async fn interview_context(state: &AppState, session: &InterviewSession) -> ApiResult<InterviewContext> {
    let resume_text = match session.resume_id {
        Some(resume_id) => UserResume::find_by_id(&state.db, resume_id).await?.map(|r| r.content_text),
        None => None,
    };
    let max_questions = state.settings.max_questions().await;

    Ok(InterviewContext::for_session(session, resume_text, max_questions))
}

/// Asks the interviewer for its next message and stores it
async fn interviewer_turn(state: &AppState, session: &InterviewSession) -> ApiResult<InterviewMessage> {
    let hub = &state.hub;
    hub.emit_to_session(
        session.id,
        ServerEvent::InterviewerTyping {
            session_id: session.id,
            typing: true,
        },
    );

    let result = async {
        let context = interview_context(state, session).await?;
        let history = InterviewMessage::list_for_session(&state.db, session.id).await?;
        let reply = state
            .interviewer
            .reply(&context, &Turn::from_messages(&history))
            .await?;

        let message = InterviewMessage::create(&state.db, session.id, MessageSender::Interviewer, &reply, None).await?;
        InterviewSession::touch(&state.db, session.id).await?;
        Ok::<_, ApiError>(message)
    }
    .await;

    hub.emit_to_session(
        session.id,
        ServerEvent::InterviewerTyping {
            session_id: session.id,
            typing: false,
        },
    );

    let message = result?;
    hub.emit_to_session(session.id, ServerEvent::NewMessage(message.clone()));
    Ok(message)
}

/// Persists a candidate message and produces the interviewer's reply
///
/// Shared by the REST endpoint and the WebSocket `send_message` event.
pub async fn converse(state: &AppState, session: &InterviewSession, content: &str) -> ApiResult<Exchange> {
    if session.get_status() != Some(SessionStatus::InProgress) {
        return Err(ApiError::bad_request(
            "SESSION_NOT_ACTIVE",
            "Messages can only be sent while the interview is in progress",
        ));
    }

    let content = content.trim();
    if content.is_empty() {
        return Err(ApiError::invalid_field("content", "Message must not be empty"));
    }

    let message = InterviewMessage::create(&state.db, session.id, MessageSender::Candidate, content, None).await?;
    state
        .hub
        .emit_to_session(session.id, ServerEvent::NewMessage(message.clone()));

    let reply = interviewer_turn(state, session).await?;

    Ok(Exchange { message, reply })
}

/// Create a session
///
/// # Errors
///
/// - `400 VALIDATION_ERROR`: unknown interview type or difficulty
/// - `400 INSUFFICIENT_CREDITS`: balance below the configured session cost
/// - `403 QUOTA_EXCEEDED`: tenant used up its monthly sessions
/// - `404 NOT_FOUND`: resume not found
/// - `503 SERVICE_UNAVAILABLE`: maintenance mode
pub async fn create(
    State(state): State<AppState>,
    auth: AuthContext,
    CurrentUser(user): CurrentUser,
    ValidJson(req): ValidJson<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<CreateSessionResponse>)> {
    super::ensure_open(&state).await?;

    let interview_type = InterviewType::parse(&req.interview_type)
        .ok_or_else(|| ApiError::invalid_field("interview_type", "Unknown interview type"))?;
    let difficulty = match req.difficulty.as_deref() {
        Some(raw) => Difficulty::parse(raw).ok_or_else(|| ApiError::invalid_field("difficulty", "Unknown difficulty"))?,
        None => Difficulty::Medium,
    };

    if let Some(resume_id) = req.resume_id {
        UserResume::find_for_user(&state.db, resume_id, user.id)
            .await?
            .ok_or_else(|| ApiError::not_found("Resume not found"))?;
    }

    if let Some(tenant_id) = req.tenant_id {
        require_tenant_role(&state.db, &auth, tenant_id, TenantRole::Member).await?;
        state.quotas.enforce(tenant_id, QuotaType::MonthlySessions).await?;
    }

    let title = req
        .title
        .unwrap_or_else(|| format!("{} interview: {}", interview_type.as_str(), req.job_role));

    let cost = state.settings.session_cost().await;
    let (session, balance) = InterviewSession::create_paid(
        &state.db,
        CreateSession {
            user_id: user.id,
            tenant_id: req.tenant_id,
            resume_id: req.resume_id,
            title,
            job_role: req.job_role,
            interview_type,
            difficulty,
        },
        cost,
    )
    .await?;

    tracing::info!(user_id = %user.id, session_id = %session.id, cost, balance, "Interview session created");

    state.hub.emit_to_user(user.id, ServerEvent::CreditsUpdated { balance });
    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(user.id), "session.created")
            .entity("session", session.id)
            .metadata(json!({ "cost": cost, "interview_type": session.interview_type })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(CreateSessionResponse { session, balance })))
}

pub async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(pagination): Query<Pagination>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<Page<InterviewSession>>> {
    let filter = SessionFilter {
        user_id: Some(user.id),
        tenant_id: None,
        status: parse_status(query.status.as_deref())?,
    };

    let items = InterviewSession::list(&state.db, &filter, pagination.limit(), pagination.offset()).await?;
    let total = InterviewSession::count(&state.db, &filter).await?;

    Ok(Json(pagination.wrap(items, total)))
}

pub async fn get(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionDetail>> {
    let session = owned_session(&state, id, user.id).await?;
    let message_count = InterviewMessage::list_for_session(&state.db, id).await?.len();

    Ok(Json(SessionDetail { session, message_count }))
}

pub async fn messages(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<InterviewMessage>>> {
    owned_session(&state, id, user.id).await?;
    Ok(Json(InterviewMessage::list_for_session(&state.db, id).await?))
}

pub async fn post_message(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<PostMessageRequest>,
) -> ApiResult<(StatusCode, Json<Exchange>)> {
    let session = owned_session(&state, id, user.id).await?;
    let exchange = converse(&state, &session, &req.content).await?;

    Ok((StatusCode::CREATED, Json(exchange)))
}

/// Moves a scheduled session to `in_progress` and asks the first question
pub async fn start(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Exchange>> {
    let session = owned_session(&state, id, user.id).await?;

    let session = InterviewSession::transition(&state.db, session.id, SessionStatus::InProgress)
        .await?
        .map(|t| t.session)
        .ok_or_else(|| {
            ApiError::bad_request(
                "INVALID_STATE",
                format!("A {} session cannot be started", session.status),
            )
        })?;

    state
        .hub
        .emit_to_session(session.id, ServerEvent::SessionUpdated(session.clone()));

    let greeting = InterviewMessage::create(
        &state.db,
        session.id,
        MessageSender::System,
        &format!("Interview started: {}", session.title),
        Some(json!({ "kind": "started" })),
    )
    .await?;
    let reply = interviewer_turn(&state, &session).await?;

    tracing::info!(session_id = %session.id, "Interview started");

    Ok(Json(Exchange {
        message: greeting,
        reply,
    }))
}

/// Ends an in-progress session and stores the interviewer's evaluation
pub async fn complete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<InterviewSession>> {
    let session = owned_session(&state, id, user.id).await?;

    if session.get_status() != Some(SessionStatus::InProgress) {
        return Err(ApiError::bad_request(
            "INVALID_STATE",
            format!("A {} session cannot be completed", session.status),
        ));
    }

    let context = interview_context(&state, &session).await?;
    let history = InterviewMessage::list_for_session(&state.db, session.id).await?;
    let evaluation = state
        .interviewer
        .evaluate(&context, &Turn::from_messages(&history))
        .await?;

    let session = InterviewSession::complete(&state.db, session.id, evaluation.score, &evaluation.feedback)
        .await?
        .ok_or_else(|| ApiError::bad_request("INVALID_STATE", "Session is no longer in progress"))?;

    tracing::info!(session_id = %session.id, score = evaluation.score, "Interview completed");

    state
        .hub
        .emit_to_session(session.id, ServerEvent::SessionUpdated(session.clone()));
    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(user.id), "session.completed")
            .entity("session", session.id)
            .metadata(json!({ "score": evaluation.score })),
    )
    .await;

    Ok(Json(session))
}

/// Cancels a session; credits come back only if it never started
pub async fn cancel(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<InterviewSession>> {
    let session = owned_session(&state, id, user.id).await?;

    let transition = InterviewSession::transition(&state.db, session.id, SessionStatus::Cancelled)
        .await?
        .ok_or_else(|| {
            ApiError::bad_request(
                "INVALID_STATE",
                format!("A {} session cannot be cancelled", session.status),
            )
        })?;
    let was_scheduled = transition.previous() == Some(SessionStatus::Scheduled);
    let session = transition.session;

    if was_scheduled && session.credits_used > 0 {
        let reference = session.id.to_string();
        match CreditTransaction::apply_standalone(
            &state.db,
            user.id,
            session.credits_used,
            CreditKind::Refund,
            Some(&reference),
            Some("Cancelled before start"),
        )
        .await
        {
            Ok(entry) => {
                state.hub.emit_to_user(
                    user.id,
                    ServerEvent::CreditsUpdated {
                        balance: entry.balance_after,
                    },
                );
            }
            Err(CreditError::Duplicate(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    state
        .hub
        .emit_to_session(session.id, ServerEvent::SessionUpdated(session.clone()));

    Ok(Json(session))
}
