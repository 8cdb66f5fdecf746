/// Request authentication for Axum
///
/// Credentials come from `Authorization: Bearer <access JWT>` or, for
/// tenant-scoped integrations, `X-Api-Key: mm_...`. A successful check yields
/// an [`AuthContext`] that the API's middleware layers insert into request
/// extensions; handlers then take it as an extractor.
///
/// # Example
///
/// ```no_run
/// use mockmate_shared::auth::middleware::AuthContext;
///
/// async fn protected_handler(auth: AuthContext) -> String {
///     format!("Hello, user {:?}!", auth.user_id)
/// }
/// ```

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::authorization::AuthzError;
use super::jwt::{validate_access_token, Claims, JwtError};
use crate::models::tenant_api_key::TenantApiKey;
use crate::models::user::UserRole;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Authentication method used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Jwt,
    ApiKey,
}

/// Who is calling
///
/// JWT callers are users with a platform role; API-key callers act for a
/// tenant with a fixed set of scopes and no user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Option<Uuid>,
    pub role: Option<UserRole>,
    pub tenant_id: Option<Uuid>,
    pub method: AuthMethod,

    /// API key scopes (only for API key auth)
    pub scopes: Option<Vec<String>>,

    /// API key ID (only for API key auth)
    pub api_key_id: Option<Uuid>,
}

impl AuthContext {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            user_id: Some(claims.sub),
            role: Some(claims.role),
            tenant_id: claims.tenant_id,
            method: AuthMethod::Jwt,
            scopes: None,
            api_key_id: None,
        }
    }

    pub fn from_api_key(api_key: &TenantApiKey) -> Self {
        Self {
            user_id: None,
            role: None,
            tenant_id: Some(api_key.tenant_id),
            method: AuthMethod::ApiKey,
            scopes: Some(api_key.scopes.clone()),
            api_key_id: Some(api_key.id),
        }
    }

    /// The calling user, or an error for API-key callers
    pub fn require_user(&self) -> Result<Uuid, AuthzError> {
        self.user_id.ok_or(AuthzError::UserRequired)
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_some_and(|r| r.is_admin())
    }

    /// JWT callers have every scope; API keys only the ones they were issued
    pub fn has_scope(&self, required_scope: &str) -> bool {
        match self.method {
            AuthMethod::Jwt => true,
            AuthMethod::ApiKey => self
                .scopes
                .as_deref()
                .is_some_and(|scopes| super::api_key::has_scope(scopes, required_scope)),
        }
    }
}

/// Authentication failure
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing credentials")]
    MissingCredentials,

    #[error("{0}")]
    InvalidFormat(String),

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Invalid or revoked API key")]
    InvalidApiKey,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials | AuthError::InvalidFormat(_) => "UNAUTHORIZED",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::InvalidToken(_) => "TOKEN_INVALID",
            AuthError::InvalidApiKey => "INVALID_API_KEY",
            AuthError::Database(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::TokenExpired,
            other => AuthError::InvalidToken(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match &self {
            AuthError::Database(e) => {
                tracing::error!(error = %e, "Database error during authentication");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = serde_json::json!({ "code": self.code(), "message": message });
        (self.status(), Json(body)).into_response()
    }
}

/// Extracts the token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))
}

/// Validates an access token and builds the caller context
pub fn authenticate_token(token: &str, secret: &str) -> Result<AuthContext, AuthError> {
    let claims = validate_access_token(token, secret)?;
    Ok(AuthContext::from_claims(&claims))
}

pub fn authenticate_bearer(headers: &HeaderMap, secret: &str) -> Result<AuthContext, AuthError> {
    authenticate_token(bearer_token(headers)?, secret)
}

/// Looks up the `X-Api-Key` header; `Ok(None)` when the header is absent
pub async fn authenticate_api_key(pool: &PgPool, headers: &HeaderMap) -> Result<Option<AuthContext>, AuthError> {
    let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) else {
        return Ok(None);
    };

    if !super::api_key::validate_api_key_format(key) {
        return Err(AuthError::InvalidFormat("Invalid API key format".to_string()));
    }

    let api_key = TenantApiKey::validate(pool, key)
        .await?
        .ok_or(AuthError::InvalidApiKey)?;

    Ok(Some(AuthContext::from_api_key(&api_key)))
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthContext {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::MissingCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{create_token, TokenTtl, TokenType};
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret-key-that-is-long-enough!!";

    #[test]
    fn test_auth_context_from_claims() {
        let user_id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();
        let claims = Claims::new(user_id, UserRole::Admin, Some(tenant_id), TokenType::Access, &TokenTtl::default());

        let context = AuthContext::from_claims(&claims);

        assert_eq!(context.user_id, Some(user_id));
        assert_eq!(context.tenant_id, Some(tenant_id));
        assert_eq!(context.method, AuthMethod::Jwt);
        assert!(context.is_admin());
        assert!(context.has_scope("anything"));
        assert_eq!(context.require_user().unwrap(), user_id);
    }

    #[test]
    fn test_api_key_context_scopes() {
        let context = AuthContext {
            user_id: None,
            role: None,
            tenant_id: Some(Uuid::new_v4()),
            method: AuthMethod::ApiKey,
            scopes: Some(vec!["sessions:*".to_string()]),
            api_key_id: Some(Uuid::new_v4()),
        };

        assert!(context.has_scope("sessions:read"));
        assert!(!context.has_scope("users:read"));
        assert!(!context.is_admin());
        assert!(context.require_user().is_err());
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(matches!(bearer_token(&headers), Err(AuthError::MissingCredentials)));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(bearer_token(&headers), Err(AuthError::InvalidFormat(_))));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def");
    }

    #[test]
    fn test_authenticate_bearer() {
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, UserRole::User, None, TokenType::Access, &TokenTtl::default());
        let token = create_token(&claims, SECRET).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );

        let ctx = authenticate_bearer(&headers, SECRET).unwrap();
        assert_eq!(ctx.user_id, Some(user_id));

        assert!(matches!(
            authenticate_bearer(&headers, "some-other-secret-also-32-bytes-long"),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_refresh_token_rejected_as_access() {
        let claims = Claims::new(Uuid::new_v4(), UserRole::User, None, TokenType::Refresh, &TokenTtl::default());
        let token = create_token(&claims, SECRET).unwrap();
        assert!(authenticate_token(&token, SECRET).is_err());
    }

    #[test]
    fn test_auth_error_into_response() {
        assert_eq!(AuthError::MissingCredentials.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::TokenExpired.code(), "TOKEN_EXPIRED");
        assert_eq!(
            AuthError::Database(sqlx::Error::PoolTimedOut).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
