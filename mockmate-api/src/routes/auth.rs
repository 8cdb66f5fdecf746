/// Authentication and account endpoints
///
/// # Endpoints
///
/// - `POST /api/auth/register` - Create an account (signup bonus credited)
/// - `POST /api/auth/login` - Email/password login
/// - `POST /api/auth/refresh` - New token pair from a refresh token
/// - `POST /api/auth/forgot-password` - Email a reset link
/// - `POST /api/auth/reset-password` - Set a new password with a reset token
/// - `GET /api/auth/me` / `PUT /api/auth/me` - Profile
/// - `POST /api/auth/change-password`
/// - `DELETE /api/auth/account` - Delete the account and its data
/// - `GET /api/auth/providers` - Enabled login providers

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ValidJson,
    middleware::auth::CurrentUser,
};
use axum::{
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use mockmate_shared::{
    auth::{
        jwt::{issue_token_pair, validate_refresh_token, TokenPair},
        password,
    },
    email::templates,
    models::{
        activity_log::{ActivityLog, NewActivity},
        auth_provider_config::{AuthProviderConfig, PublicProvider},
        credit_transaction::{CreditKind, CreditTransaction},
        password_reset_token::PasswordResetToken,
        tenant::Tenant,
        tenant_user::{TenantRole, TenantUser, UserTenant},
        user::{normalize_email, CreateUser, PurgeSummary, UpdateUser, User, UserStatus},
    },
    quota::QuotaType,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Strength is checked separately against the password policy
    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,

    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    #[validate(length(min = 6, max = 20, message = "Phone must be 6-20 characters"))]
    pub phone: Option<String>,

    /// Join an existing organization as a member
    pub tenant_slug: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, max = 128, message = "Token is required"))]
    pub token: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    #[validate(length(min = 6, max = 20, message = "Phone must be 6-20 characters"))]
    pub phone: Option<String>,

    #[validate(url(message = "Avatar must be a URL"))]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DeleteAccountRequest {
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProvidersQuery {
    pub tenant_id: Option<Uuid>,
}

/// Returned by register, login and OTP login
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,

    #[serde(flatten)]
    pub tokens: TokenPair,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub tenants: Vec<UserTenant>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Runs Argon2 on the blocking pool
pub(crate) async fn hash_password(plain: String) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| ApiError::internal(format!("Password hashing task failed: {}", e)))?
        .map_err(ApiError::from)
}

async fn verify_password(plain: String, hash: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || password::verify_password(&plain, &hash))
        .await
        .map_err(|e| ApiError::internal(format!("Password verification task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Same Argon2 cost as a real check, for emails with no account
async fn verify_absent_account(plain: String) {
    if let Err(e) = tokio::task::spawn_blocking(move || password::verify_absent_account(&plain)).await {
        tracing::warn!(error = %e, "Placeholder password check failed");
    }
}

fn check_strength(field: &str, candidate: &str) -> ApiResult<()> {
    password::validate_password_strength(candidate).map_err(|message| ApiError::invalid_field(field, message))
}

/// Issues tokens scoped to the user's first organization, if any
pub(crate) async fn sign_in(state: &AppState, user: User) -> ApiResult<AuthResponse> {
    let tenant_id = TenantUser::list_for_user(&state.db, user.id)
        .await?
        .first()
        .map(|t| t.tenant_id);

    let tokens = issue_token_pair(user.id, user.role, tenant_id, state.jwt_secret(), &state.token_ttl())?;
    User::record_login(&state.db, user.id).await?;

    Ok(AuthResponse { user, tokens, tenant_id })
}

pub(crate) fn ensure_active(user: &User) -> ApiResult<()> {
    if user.get_status() == Some(UserStatus::Suspended) {
        return Err(ApiError::forbidden("ACCOUNT_SUSPENDED", "This account has been suspended"));
    }
    Ok(())
}

/// Register a new user
///
/// The account, its signup bonus and the optional organization membership
/// are written in one transaction.
///
/// # Errors
///
/// - `400 VALIDATION_ERROR`: malformed input or weak password
/// - `400 USER_EXISTS`: email already registered
/// - `403 QUOTA_EXCEEDED`: the organization has no free seats
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    check_strength("password", &req.password)?;

    let email = normalize_email(&req.email);
    if User::email_exists(&state.db, &email).await? {
        return Err(ApiError::bad_request("USER_EXISTS", "An account with this email already exists"));
    }

    let tenant = match req.tenant_slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => {
            let tenant = Tenant::find_by_slug(&state.db, slug)
                .await?
                .filter(Tenant::is_active)
                .ok_or_else(|| ApiError::invalid_field("tenant_slug", "Unknown organization"))?;
            state.quotas.enforce(tenant.id, QuotaType::Members).await?;
            Some(tenant)
        }
        None => None,
    };

    let password_hash = hash_password(req.password).await?;
    let bonus = state.settings.signup_bonus().await;

    let mut tx = state.db.begin().await?;

    let mut user = User::create(
        &mut *tx,
        CreateUser {
            name: req.name,
            phone: req.phone,
            ..CreateUser::new(email, password_hash)
        },
    )
    .await?;

    if bonus > 0 {
        let reference = format!("signup:{}", user.id);
        let entry = CreditTransaction::apply(
            &mut *tx,
            user.id,
            bonus,
            CreditKind::SignupBonus,
            Some(&reference),
            Some("Signup bonus"),
        )
        .await?;
        user.credits = entry.balance_after;
    }

    if let Some(tenant) = &tenant {
        TenantUser::add(&mut *tx, tenant.id, user.id, TenantRole::Member).await?;
    }

    tx.commit().await?;

    tracing::info!(user_id = %user.id, tenant_id = ?tenant.as_ref().map(|t| t.id), "User registered");

    state.email.send_template_detached(
        user.email.clone(),
        templates::WELCOME,
        json!({
            "app_name": state.settings.app_name().await,
            "name": user.name.as_deref().unwrap_or("there"),
            "credits": user.credits,
            "support_email": state.settings.support_email().await,
        }),
    );

    if state.settings.require_email_verification().await {
        super::email_verification::send_link(&state, &user).await?;
    }

    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(user.id), "auth.register")
            .entity("user", user.id)
            .metadata(json!({ "signup_bonus": bonus }))
            .ip(super::client_ip(&state, &headers, connect)),
    )
    .await;

    let response = sign_in(&state, user).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Email/password login
///
/// # Errors
///
/// - `401 INVALID_CREDENTIALS`: unknown email or wrong password
/// - `403 ACCOUNT_SUSPENDED`
/// - `403 EMAIL_NOT_VERIFIED`: verification is required and still pending
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let invalid = || ApiError::unauthorized("INVALID_CREDENTIALS", "Invalid email or password");

    let Some(user) = User::find_by_email(&state.db, &req.email).await? else {
        verify_absent_account(req.password).await;
        return Err(invalid());
    };

    if !verify_password(req.password.clone(), user.password_hash.clone()).await? {
        tracing::debug!(user_id = %user.id, "Login with wrong password");
        return Err(invalid());
    }

    ensure_active(&user)?;

    if !user.email_verified && !user.is_admin() && state.settings.require_email_verification().await {
        return Err(ApiError::forbidden(
            "EMAIL_NOT_VERIFIED",
            "Verify your email address before logging in",
        ));
    }

    if password::needs_rehash(&user.password_hash) {
        let upgraded = hash_password(req.password).await?;
        User::update_password(&state.db, user.id, &upgraded).await?;
        tracing::debug!(user_id = %user.id, "Password hash upgraded");
    }

    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(user.id), "auth.login").ip(super::client_ip(&state, &headers, connect)),
    )
    .await;

    Ok(Json(sign_in(&state, user).await?))
}

/// Exchanges a refresh token for a new pair
///
/// The account is re-read so suspended users cannot keep refreshing.
pub async fn refresh(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let claims = validate_refresh_token(&req.refresh_token, state.jwt_secret())?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("TOKEN_INVALID", "Account no longer exists"))?;
    ensure_active(&user)?;

    let tokens = issue_token_pair(user.id, user.role, claims.tenant_id, state.jwt_secret(), &state.token_ttl())?;
    Ok(Json(tokens))
}

/// Always answers 200 so the endpoint cannot be used to discover accounts
pub async fn forgot_password(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ForgotPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let response = MessageResponse {
        message: "If an account exists for this email, a reset link has been sent",
    };

    let Some(user) = User::find_by_email(&state.db, &req.email).await? else {
        return Ok(Json(response));
    };
    if !user.is_active() {
        return Ok(Json(response));
    }

    let ttl = state.settings.password_reset_ttl().await;
    let (_, plaintext) = PasswordResetToken::create(&state.db, user.id, ttl).await?;

    state.email.send_template_detached(
        user.email.clone(),
        templates::PASSWORD_RESET,
        json!({
            "app_name": state.settings.app_name().await,
            "name": user.name.as_deref().unwrap_or("there"),
            "link": state.config.app_url(&format!("reset-password?token={}", plaintext)),
            "minutes": ttl.num_minutes(),
        }),
    );

    tracing::info!(user_id = %user.id, "Password reset requested");
    ActivityLog::record_quietly(&state.db, NewActivity::new(Some(user.id), "auth.password_reset_requested")).await;

    Ok(Json(response))
}

pub async fn reset_password(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    check_strength("password", &req.password)?;

    let password_hash = hash_password(req.password).await?;
    let user_id = PasswordResetToken::redeem(&state.db, &req.token, &password_hash)
        .await?
        .map_err(super::email_verification::link_rejection)?;

    tracing::info!(%user_id, "Password reset completed");
    ActivityLog::record_quietly(&state.db, NewActivity::new(Some(user_id), "auth.password_reset")).await;

    Ok(Json(MessageResponse {
        message: "Password has been reset",
    }))
}

pub async fn me(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Json<MeResponse>> {
    let tenants = TenantUser::list_for_user(&state.db, user.id).await?;
    Ok(Json(MeResponse { user, tenants }))
}

pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidJson(req): ValidJson<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    let updated = User::update(
        &state.db,
        user.id,
        UpdateUser {
            name: req.name,
            phone: req.phone,
            avatar_url: req.avatar_url,
            ..Default::default()
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(updated))
}

pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidJson(req): ValidJson<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if !verify_password(req.current_password, user.password_hash.clone()).await? {
        return Err(ApiError::invalid_field("current_password", "Current password is incorrect"));
    }
    check_strength("new_password", &req.new_password)?;

    let password_hash = hash_password(req.new_password).await?;
    User::update_password(&state.db, user.id, &password_hash).await?;

    tracing::info!(user_id = %user.id, "Password changed");
    ActivityLog::record_quietly(&state.db, NewActivity::new(Some(user.id), "auth.password_changed")).await;

    Ok(Json(MessageResponse {
        message: "Password changed",
    }))
}

/// Deletes the caller's account and everything it owns
pub async fn delete_account(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidJson(req): ValidJson<DeleteAccountRequest>,
) -> ApiResult<Json<PurgeSummary>> {
    if !verify_password(req.password, user.password_hash.clone()).await? {
        return Err(ApiError::invalid_field("password", "Password is incorrect"));
    }

    let summary = User::purge_data(&state.db, user.id, true)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    tracing::info!(user_id = %user.id, sessions = summary.sessions, "Account deleted by owner");
    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(None, "auth.account_deleted").entity("user", user.id),
    )
    .await;

    Ok(Json(summary))
}

/// Login providers enabled globally or for `?tenant_id=`
pub async fn providers(
    State(state): State<AppState>,
    Query(query): Query<ProvidersQuery>,
) -> ApiResult<Json<Vec<PublicProvider>>> {
    Ok(Json(
        AuthProviderConfig::enabled_providers(&state.db, query.tenant_id).await?,
    ))
}
