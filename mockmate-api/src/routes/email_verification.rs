/// Email verification endpoints
///
/// - `POST /api/email-verification/send` - Email a fresh link (auth)
/// - `GET /api/email-verification/status` - Verification state (auth)
/// - `POST /api/email-verification/verify` - Redeem a link token
///
/// Links carry a 32-character random token; only its SHA-256 hash is stored.
/// Sending a new link invalidates the previous ones.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ValidJson,
    middleware::auth::CurrentUser,
};
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use mockmate_shared::email::templates;
use mockmate_shared::models::{
    activity_log::{ActivityLog, NewActivity},
    email_verification_token::{EmailVerificationToken, LinkTokenRejection},
    user::User,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyRequest {
    #[validate(length(min = 1, max = 128, message = "Token is required"))]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub message: &'static str,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub email: String,
    pub email_verified: bool,
    pub required: bool,

    /// Expiry of the newest unused link, if any
    pub pending_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub message: &'static str,
    pub user: User,
}

/// Maps a rejected link token to the client-facing error
pub(crate) fn link_rejection(rejection: LinkTokenRejection) -> ApiError {
    match rejection {
        LinkTokenRejection::Expired => ApiError::bad_request("TOKEN_EXPIRED", "This link has expired"),
        LinkTokenRejection::Used => ApiError::bad_request("TOKEN_INVALID", "This link has already been used"),
        LinkTokenRejection::Unknown => ApiError::bad_request("TOKEN_INVALID", "This link is not valid"),
    }
}

/// Creates a link token and emails it
pub(crate) async fn send_link(state: &AppState, user: &User) -> ApiResult<EmailVerificationToken> {
    let ttl = state.settings.email_verification_ttl().await;
    let (token, plaintext) = EmailVerificationToken::create(&state.db, user.id, ttl).await?;

    let vars = json!({
        "app_name": state.settings.app_name().await,
        "name": user.name.as_deref().unwrap_or("there"),
        "link": state.config.app_url(&format!("verify-email?token={}", plaintext)),
        "hours": ttl.num_hours(),
    });
    state
        .email
        .send_template_detached(user.email.clone(), templates::EMAIL_VERIFICATION, vars);

    tracing::info!(user_id = %user.id, "Verification email queued");
    Ok(token)
}

pub async fn send(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Json<SendResponse>> {
    if user.email_verified {
        return Err(ApiError::bad_request(
            "EMAIL_ALREADY_VERIFIED",
            "This email address is already verified",
        ));
    }

    // Reuse the OTP resend cooldown so the endpoint cannot be used to spam
    let cooldown = state.settings.otp_policy().await.cooldown;
    if let Some(latest) = EmailVerificationToken::latest_for_user(&state.db, user.id).await? {
        let ready_at = latest.created_at + cooldown;
        let now = Utc::now();
        if latest.used_at.is_none() && ready_at > now {
            let retry_after = (ready_at - now).num_seconds().max(1) as u64;
            return Err(ApiError::RateLimitExceeded {
                retry_after,
                limit: 1,
                message: format!("Please wait {} seconds before requesting another link", retry_after),
            });
        }
    }

    let token = send_link(&state, &user).await?;

    Ok(Json(SendResponse {
        message: "Verification email sent",
        expires_at: token.expires_at,
    }))
}

pub async fn status(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Json<StatusResponse>> {
    let pending_expires_at = if user.email_verified {
        None
    } else {
        EmailVerificationToken::latest_for_user(&state.db, user.id)
            .await?
            .filter(|t| t.used_at.is_none() && t.expires_at > Utc::now())
            .map(|t| t.expires_at)
    };

    Ok(Json(StatusResponse {
        email: user.email,
        email_verified: user.email_verified,
        required: state.settings.require_email_verification().await,
        pending_expires_at,
    }))
}

pub async fn verify(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<VerifyRequest>,
) -> ApiResult<Json<VerifyResponse>> {
    let user = EmailVerificationToken::consume(&state.db, &req.token)
        .await?
        .map_err(link_rejection)?;

    tracing::info!(user_id = %user.id, "Email verified");
    ActivityLog::record_quietly(&state.db, NewActivity::new(Some(user.id), "auth.email_verified")).await;

    Ok(Json(VerifyResponse {
        message: "Email verified",
        user,
    }))
}
