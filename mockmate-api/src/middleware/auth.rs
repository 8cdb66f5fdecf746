/// Authentication layers
///
/// - [`require_user`]: a valid access JWT for an existing, active account
/// - [`require_admin`]: stacked after `require_user`, needs the admin role
/// - [`user_or_api_key`]: a tenant API key (`X-Api-Key`) or a user JWT
///
/// On success the layer inserts an [`AuthContext`] (and, for users, the
/// [`CurrentUser`] row) into request extensions for handlers to extract.

use crate::{app::AppState, error::ApiError};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use mockmate_shared::auth::jwt::validate_access_token;
use mockmate_shared::auth::middleware::{authenticate_api_key, bearer_token, AuthContext, AuthMethod};
use mockmate_shared::models::user::{User, UserStatus};

/// The authenticated user's row as loaded for this request
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("UNAUTHORIZED", "Authentication required"))
    }
}

/// Resolves a raw access token to the caller
///
/// The role is taken from the database, not the token, so demotions and
/// suspensions apply immediately.
pub async fn authenticate_user(state: &AppState, token: &str) -> Result<(AuthContext, User), ApiError> {
    let claims = validate_access_token(token, state.jwt_secret())?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("UNAUTHORIZED", "Account no longer exists"))?;

    if user.get_status() == Some(UserStatus::Suspended) {
        return Err(ApiError::forbidden("ACCOUNT_SUSPENDED", "This account has been suspended"));
    }

    let context = AuthContext {
        user_id: Some(user.id),
        role: Some(user.role),
        tenant_id: claims.tenant_id,
        method: AuthMethod::Jwt,
        scopes: None,
        api_key_id: None,
    };

    Ok((context, user))
}

async fn authenticate_headers(state: &AppState, headers: &HeaderMap) -> Result<(AuthContext, User), ApiError> {
    let token = bearer_token(headers)?;
    authenticate_user(state, token).await
}

pub async fn require_user(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let (context, user) = authenticate_headers(&state, req.headers()).await?;

    req.extensions_mut().insert(context);
    req.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(req).await)
}

pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    let is_admin = req.extensions().get::<AuthContext>().is_some_and(|ctx| ctx.is_admin());

    if !is_admin {
        return Err(ApiError::forbidden("FORBIDDEN", "Admin access required"));
    }

    Ok(next.run(req).await)
}

pub async fn user_or_api_key(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(context) = authenticate_api_key(&state.db, req.headers()).await? {
        tracing::debug!(api_key_id = ?context.api_key_id, tenant_id = ?context.tenant_id, "API key request");
        req.extensions_mut().insert(context);
        return Ok(next.run(req).await);
    }

    let (context, user) = authenticate_headers(&state, req.headers()).await?;
    req.extensions_mut().insert(context);
    req.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(req).await)
}
