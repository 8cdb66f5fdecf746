/// JWT issuance and validation for MockMate sessions
///
/// Access and refresh tokens are HS256-signed JWTs issued by `mockmate`.
/// Besides the registered claims they carry the platform role of the user
/// and, when the login happened in a tenant context, the tenant id.
///
/// Lifetimes are configured by the API (`JWT_ACCESS_TTL_MINUTES`,
/// `JWT_REFRESH_TTL_DAYS`) and passed in through [`TokenTtl`].
///
/// # Example
///
/// ```
/// use mockmate_shared::auth::jwt::{create_token, validate_access_token, Claims, TokenTtl, TokenType};
/// use mockmate_shared::models::user::UserRole;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let secret = "an-example-secret-that-is-32-bytes!!";
/// let user_id = Uuid::new_v4();
///
/// let claims = Claims::new(user_id, UserRole::User, None, TokenType::Access, &TokenTtl::default());
/// let token = create_token(&claims, secret)?;
///
/// let validated = validate_access_token(&token, secret)?;
/// assert_eq!(validated.sub, user_id);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::UserRole;

/// Issuer written into and required from every token
pub const ISSUER: &str = "mockmate";

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Signature, issuer or structure did not check out
    #[error("Invalid token: {0}")]
    Invalid(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// A refresh token was presented where an access token is required, or vice versa
    #[error("Wrong token type: expected {expected}")]
    WrongType { expected: &'static str },
}

/// Token type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// Configured token lifetimes
#[derive(Debug, Clone, Copy)]
pub struct TokenTtl {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenTtl {
    fn default() -> Self {
        Self {
            access: Duration::minutes(60),
            refresh: Duration::days(30),
        }
    }
}

impl TokenTtl {
    pub fn for_type(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => self.access,
            TokenType::Refresh => self.refresh,
        }
    }
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - user id
    pub sub: Uuid,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,

    /// Platform role at issue time
    pub role: UserRole,

    /// Tenant context, if the user logged in through a tenant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,

    pub token_type: TokenType,
}

impl Claims {
    /// Builds claims expiring after the configured lifetime for `token_type`
    pub fn new(
        user_id: Uuid,
        role: UserRole,
        tenant_id: Option<Uuid>,
        token_type: TokenType,
        ttl: &TokenTtl,
    ) -> Self {
        Self::with_expiration(user_id, role, tenant_id, token_type, ttl.for_type(token_type))
    }

    /// Builds claims with an explicit lifetime
    pub fn with_expiration(
        user_id: Uuid,
        role: UserRole,
        tenant_id: Option<Uuid>,
        token_type: TokenType,
        expires_in: Duration,
    ) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
            role,
            tenant_id,
            token_type,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    /// Seconds until expiry, `None` once expired
    pub fn expires_in_secs(&self) -> Option<i64> {
        let remaining = self.exp - Utc::now().timestamp();
        (remaining > 0).then_some(remaining)
    }
}

/// An access/refresh pair as returned by the login endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Signs claims with HS256
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&Header::new(Algorithm::HS256), claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Issues a fresh access/refresh pair for a user
pub fn issue_token_pair(
    user_id: Uuid,
    role: UserRole,
    tenant_id: Option<Uuid>,
    secret: &str,
    ttl: &TokenTtl,
) -> Result<TokenPair, JwtError> {
    let access = Claims::new(user_id, role, tenant_id, TokenType::Access, ttl);
    let refresh = Claims::new(user_id, role, tenant_id, TokenType::Refresh, ttl);

    Ok(TokenPair {
        access_token: create_token(&access, secret)?,
        refresh_token: create_token(&refresh, secret)?,
        token_type: "Bearer".to_string(),
        expires_in: ttl.access.num_seconds(),
    })
}

/// Validates signature, expiry, not-before and issuer and returns the claims
///
/// # Errors
///
/// `JwtError::Expired` for expired tokens, `JwtError::Invalid` for everything
/// else that fails validation.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.leeway = 5;

    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            _ => JwtError::Invalid(e.to_string()),
        })
}

/// Validates a token and requires it to be an access token
pub fn validate_access_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let claims = validate_token(token, secret)?;
    if claims.token_type != TokenType::Access {
        return Err(JwtError::WrongType { expected: "access" });
    }
    Ok(claims)
}

/// Validates a token and requires it to be a refresh token
pub fn validate_refresh_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let claims = validate_token(token, secret)?;
    if claims.token_type != TokenType::Refresh {
        return Err(JwtError::WrongType { expected: "refresh" });
    }
    Ok(claims)
}
