/// One-time code endpoints
///
/// - `POST /api/otp/send` - Email a numeric code
/// - `POST /api/otp/verify` - Check a code
///
/// What a valid code yields depends on its purpose:
///
/// | purpose          | result                                   |
/// |------------------|------------------------------------------|
/// | `login`          | token pair, as from password login        |
/// | `verify_email`   | the account's email is marked verified    |
/// | `password_reset` | a reset token for `/api/auth/reset-password` |
///
/// Codes are only delivered by email. `send` answers the same way whether
/// or not an account exists for `login` and `password_reset`.

use super::auth::{ensure_active, sign_in, AuthResponse};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ValidJson,
};
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use mockmate_shared::email::templates;
use mockmate_shared::models::{
    activity_log::{ActivityLog, NewActivity},
    otp_code::{normalize_identifier, IssueOutcome, OtpCode, OtpPurpose, OtpVerification},
    password_reset_token::PasswordResetToken,
    user::User,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct SendOtpRequest {
    #[validate(email(message = "Codes can only be sent to an email address"))]
    pub identifier: String,

    pub purpose: OtpPurpose,
}

#[derive(Debug, Serialize)]
pub struct SendOtpResponse {
    pub message: &'static str,

    /// Seconds before another code may be requested
    pub resend_after: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(email(message = "Invalid email format"))]
    pub identifier: String,

    pub purpose: OtpPurpose,

    #[validate(length(min = 4, max = 10, message = "Code must be 4-10 digits"))]
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum VerifyOtpResponse {
    SignedIn(AuthResponse),
    Verified {
        verified: bool,
        identifier: String,
    },
    ResetToken {
        reset_token: String,
        expires_at: DateTime<Utc>,
    },
}

fn verification_error(outcome: &OtpVerification) -> Option<ApiError> {
    match outcome {
        OtpVerification::Valid(_) => None,
        OtpVerification::Invalid { remaining_attempts } => Some(ApiError::bad_request(
            "OTP_INVALID",
            format!("Incorrect code, {} attempts left", remaining_attempts),
        )),
        OtpVerification::Expired => Some(ApiError::bad_request("OTP_EXPIRED", "This code has expired")),
        OtpVerification::Locked => Some(ApiError::bad_request(
            "OTP_LOCKED",
            "Too many incorrect attempts, request a new code",
        )),
        OtpVerification::NotFound => Some(ApiError::bad_request("OTP_INVALID", "No active code for this address")),
    }
}

pub async fn send(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<SendOtpRequest>,
) -> ApiResult<Json<SendOtpResponse>> {
    let identifier = normalize_identifier(&req.identifier);
    let policy = state.settings.otp_policy().await;
    let response = SendOtpResponse {
        message: "If the address can receive codes, one has been sent",
        resend_after: policy.cooldown.num_seconds(),
    };

    let account = User::find_by_email(&state.db, &identifier).await?;
    let needs_account = matches!(req.purpose, OtpPurpose::Login | OtpPurpose::PasswordReset);
    match &account {
        None if needs_account => return Ok(Json(response)),
        Some(user) if !user.is_active() && needs_account => return Ok(Json(response)),
        _ => {}
    }

    if req.purpose == OtpPurpose::VerifyPhone {
        return Err(ApiError::invalid_field("purpose", "Phone verification is not available"));
    }

    match OtpCode::issue(&state.db, &identifier, req.purpose, &policy).await? {
        IssueOutcome::Cooldown { retry_after_secs } => {
            let retry_after = retry_after_secs.max(1) as u64;
            Err(ApiError::RateLimitExceeded {
                retry_after,
                limit: 1,
                message: format!("Please wait {} seconds before requesting another code", retry_after),
            })
        }
        IssueOutcome::Issued { code, expires_at } => {
            let minutes = (expires_at - Utc::now()).num_minutes().max(1);
            let vars = json!({
                "app_name": state.settings.app_name().await,
                "code": code,
                "minutes": minutes,
            });
            state.email.send_template_detached(identifier.clone(), templates::OTP, vars);

            tracing::info!(purpose = req.purpose.as_str(), "OTP issued");
            Ok(Json(response))
        }
    }
}

pub async fn verify(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<VerifyOtpRequest>,
) -> ApiResult<Json<VerifyOtpResponse>> {
    let identifier = normalize_identifier(&req.identifier);
    let outcome = OtpCode::verify(&state.db, &identifier, req.purpose, req.code.trim()).await?;

    if let Some(error) = verification_error(&outcome) {
        tracing::debug!(purpose = req.purpose.as_str(), outcome = ?outcome, "OTP rejected");
        return Err(error);
    }

    let account = User::find_by_email(&state.db, &identifier).await?;

    let response = match req.purpose {
        OtpPurpose::Login => {
            let user = account.ok_or_else(|| ApiError::bad_request("OTP_INVALID", "No account for this address"))?;
            ensure_active(&user)?;
            if !user.email_verified {
                User::mark_email_verified(&state.db, user.id).await?;
            }
            let user = User::find_by_id(&state.db, user.id)
                .await?
                .ok_or_else(|| ApiError::not_found("User not found"))?;

            ActivityLog::record_quietly(&state.db, NewActivity::new(Some(user.id), "auth.otp_login")).await;
            VerifyOtpResponse::SignedIn(sign_in(&state, user).await?)
        }
        OtpPurpose::PasswordReset => {
            let user = account.ok_or_else(|| ApiError::bad_request("OTP_INVALID", "No account for this address"))?;
            let ttl = state.settings.password_reset_ttl().await;
            let (token, plaintext) = PasswordResetToken::create(&state.db, user.id, ttl).await?;

            VerifyOtpResponse::ResetToken {
                reset_token: plaintext,
                expires_at: token.expires_at,
            }
        }
        OtpPurpose::VerifyEmail | OtpPurpose::VerifyPhone => {
            if let (OtpPurpose::VerifyEmail, Some(user)) = (req.purpose, &account) {
                if User::mark_email_verified(&state.db, user.id).await? {
                    tracing::info!(user_id = %user.id, "Email verified by code");
                    ActivityLog::record_quietly(&state.db, NewActivity::new(Some(user.id), "auth.email_verified")).await;
                }
            }

            VerifyOtpResponse::Verified {
                verified: true,
                identifier,
            }
        }
    };

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_error_codes() {
        let cases = [
            (OtpVerification::Invalid { remaining_attempts: 2 }, "OTP_INVALID"),
            (OtpVerification::Expired, "OTP_EXPIRED"),
            (OtpVerification::Locked, "OTP_LOCKED"),
            (OtpVerification::NotFound, "OTP_INVALID"),
        ];

        for (outcome, code) in cases {
            let error = verification_error(&outcome).expect("rejection");
            assert_eq!(error.code(), code);
        }
    }

    #[test]
    fn test_purpose_wire_names() {
        let req: SendOtpRequest =
            serde_json::from_value(json!({ "identifier": "a@b.co", "purpose": "password_reset" })).unwrap();
        assert_eq!(req.purpose, OtpPurpose::PasswordReset);
    }
}
