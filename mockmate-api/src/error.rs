/// Error handling for the API server
///
/// Every handler returns `ApiResult<T>`; failures render as
///
/// ```json
/// { "code": "VALIDATION_ERROR", "message": "...", "details": [{ "field": "email", "message": "..." }] }
/// ```
///
/// Library errors from `mockmate_shared` convert through the `From` impls at
/// the bottom of this file, so handlers can use `?` directly.
///
/// # Example
///
/// ```
/// use mockmate_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::json;
///
/// async fn handler(found: bool) -> ApiResult<Json<serde_json::Value>> {
///     if !found {
///         return Err(ApiError::not_found("Session not found"));
///     }
///     Ok(Json(json!({ "ok": true })))
/// }
/// ```

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mockmate_shared::auth::authorization::AuthzError;
use mockmate_shared::auth::jwt::JwtError;
use mockmate_shared::auth::middleware::AuthError;
use mockmate_shared::auth::password::PasswordError;
use mockmate_shared::dynamic_config::ConfigServiceError;
use mockmate_shared::email::EmailError;
use mockmate_shared::interviewer::InterviewerError;
use mockmate_shared::models::credit_transaction::CreditError;
use mockmate_shared::payments::PaymentError;
use mockmate_shared::quota::QuotaError;
use mockmate_shared::templating::TemplateError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique index on `LOWER(users.email)`
const USER_EMAIL_CONSTRAINT: &str = "users_email_unique";

/// Postgres `unique_violation`
const UNIQUE_VIOLATION: &str = "23505";

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// 400 with a domain code such as `USER_EXISTS` or `OTP_INVALID`
    BadRequest { code: &'static str, message: String },

    /// 401
    Unauthorized { code: &'static str, message: String },

    /// 403
    Forbidden { code: &'static str, message: String },

    /// 404
    NotFound(String),

    /// 409
    Conflict(String),

    /// 400 `VALIDATION_ERROR` with per-field details
    ValidationError(Vec<ValidationErrorDetail>),

    /// 429
    RateLimitExceeded {
        retry_after: u64,
        limit: u64,
        message: String,
    },

    /// 500, logged; the client sees a generic message
    InternalError(String),

    /// 503
    ServiceUnavailable(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable code, e.g. `UNAUTHORIZED`
    pub code: String,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Unauthorized {
            code,
            message: message.into(),
        }
    }

    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Forbidden {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::InternalError(message.into())
    }

    /// A single-field validation failure
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: field.to_string(),
            message: message.into(),
        }])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } | ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { code, .. }
            | ApiError::Unauthorized { code, .. }
            | ApiError::Forbidden { code, .. } => code,
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest { code, message } => write!(f, "Bad request ({}): {}", code, message),
            ApiError::Unauthorized { code, message } => write!(f, "Unauthorized ({}): {}", code, message),
            ApiError::Forbidden { code, message } => write!(f, "Forbidden ({}): {}", code, message),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::RateLimitExceeded { message, .. } => write!(f, "Rate limit exceeded: {}", message),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (message, details, rate_limit) = match self {
            ApiError::BadRequest { message, .. }
            | ApiError::Unauthorized { message, .. }
            | ApiError::Forbidden { message, .. } => (message, None, None),
            ApiError::NotFound(msg) | ApiError::Conflict(msg) | ApiError::ServiceUnavailable(msg) => {
                (msg, None, None)
            }
            ApiError::ValidationError(errors) => ("Request validation failed".to_string(), Some(errors), None),
            ApiError::RateLimitExceeded {
                retry_after,
                limit,
                message,
            } => (message, None, Some((retry_after, limit))),
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                ("An internal error occurred".to_string(), None, None)
            }
        };

        let body = Json(ErrorResponse {
            code: code.to_string(),
            message,
            details,
        });

        let mut response = (status, body).into_response();

        if let Some((retry_after, limit)) = rate_limit {
            let headers = response.headers_mut();
            headers.insert("Retry-After", HeaderValue::from(retry_after));
            headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(0u64));
            headers.insert("X-RateLimit-Reset", HeaderValue::from(retry_after));
        }

        response
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value ({})", error.code)),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::ValidationError(details)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::not_found("Resource not found"),
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                match db_err.constraint() {
                    Some(USER_EMAIL_CONSTRAINT) => {
                        ApiError::bad_request("USER_EXISTS", "An account with this email already exists")
                    }
                    Some(constraint) => ApiError::Conflict(format!("Duplicate value violates {}", constraint)),
                    None => ApiError::Conflict("Duplicate value".to_string()),
                }
            }
            other => ApiError::InternalError(format!("Database error: {}", other)),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Database(e) => e.into(),
            other => ApiError::unauthorized(other.code(), other.to_string()),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::NotMember(_) => ApiError::forbidden("FORBIDDEN", "Not a member of this tenant"),
            AuthzError::InsufficientRole { .. } => ApiError::forbidden("FORBIDDEN", "Insufficient permissions"),
            AuthzError::MissingScope(scope) => {
                ApiError::forbidden("FORBIDDEN", format!("Missing required scope: {}", scope))
            }
            AuthzError::AdminRequired => ApiError::forbidden("FORBIDDEN", "Admin access required"),
            AuthzError::UserRequired => ApiError::forbidden("FORBIDDEN", "This endpoint requires a user session"),
            AuthzError::NotAuthorized => {
                ApiError::forbidden("FORBIDDEN", "Not authorized to access this resource")
            }
            AuthzError::DatabaseError(e) => e.into(),
        }
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => ApiError::unauthorized("TOKEN_EXPIRED", "Token expired"),
            JwtError::CreateError(msg) => ApiError::InternalError(msg),
            other => ApiError::unauthorized("TOKEN_INVALID", other.to_string()),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

impl From<CreditError> for ApiError {
    fn from(err: CreditError) -> Self {
        match err {
            CreditError::Insufficient { balance, required } => ApiError::bad_request(
                "INSUFFICIENT_CREDITS",
                format!("Insufficient credits: {} required, {} available", required, balance),
            ),
            CreditError::UserNotFound(_) => ApiError::not_found("User not found"),
            CreditError::Duplicate(reference) => {
                ApiError::Conflict(format!("Credit transaction already recorded for {}", reference))
            }
            CreditError::Database(e) => e.into(),
        }
    }
}

impl From<ConfigServiceError> for ApiError {
    fn from(err: ConfigServiceError) -> Self {
        match err {
            ConfigServiceError::InvalidKey(msg) => ApiError::invalid_field("key", msg),
            e @ ConfigServiceError::OutOfRange { .. } => ApiError::invalid_field("value", e.to_string()),
            ConfigServiceError::Database(e) => e.into(),
        }
    }
}

impl From<EmailError> for ApiError {
    fn from(err: EmailError) -> Self {
        match err {
            EmailError::UnknownTemplate(key) => ApiError::not_found(format!("Unknown email template: {}", key)),
            EmailError::Address(msg) => ApiError::invalid_field("email", msg),
            EmailError::Template(e) => ApiError::bad_request("TEMPLATE_ERROR", e.to_string()),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl From<TemplateError> for ApiError {
    fn from(err: TemplateError) -> Self {
        ApiError::bad_request("TEMPLATE_ERROR", err.to_string())
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::InvalidSignature => {
                ApiError::unauthorized("INVALID_SIGNATURE", "Webhook signature verification failed")
            }
            PaymentError::InvalidData(msg) => ApiError::bad_request("INVALID_PAYLOAD", msg),
            PaymentError::WebhooksUnsupported(provider) => {
                ApiError::bad_request("WEBHOOKS_UNSUPPORTED", format!("{} does not send webhooks", provider))
            }
            other => {
                tracing::error!(error = %other, "Payment provider call failed");
                ApiError::ServiceUnavailable("Payment provider is unavailable".to_string())
            }
        }
    }
}

impl From<InterviewerError> for ApiError {
    fn from(err: InterviewerError) -> Self {
        tracing::error!(error = %err, "Interviewer call failed");
        ApiError::ServiceUnavailable("Interviewer is unavailable".to_string())
    }
}

impl From<QuotaError> for ApiError {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::LimitExceeded { .. } => ApiError::forbidden("QUOTA_EXCEEDED", err.to_string()),
            QuotaError::TenantNotFound(_) => ApiError::not_found("Tenant not found"),
            QuotaError::DatabaseError(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value, axum::http::HeaderMap) {
        let response = err.into_response();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap(), headers)
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::bad_request("OTP_INVALID", "Wrong code");
        assert_eq!(err.to_string(), "Bad request (OTP_INVALID): Wrong code");

        let err = ApiError::not_found("User not found");
        assert_eq!(err.to_string(), "Not found: User not found");
    }

    #[tokio::test]
    async fn test_validation_error_is_400_with_details() {
        let err = ApiError::ValidationError(vec![
            ValidationErrorDetail {
                field: "email".to_string(),
                message: "Invalid email format".to_string(),
            },
            ValidationErrorDetail {
                field: "password".to_string(),
                message: "Password too short".to_string(),
            },
        ]);
        assert_eq!(err.to_string(), "Validation failed: 2 errors");

        let (status, body, _) = body_json(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["details"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_internal_error_is_generic() {
        let (status, body, _) = body_json(ApiError::internal("connection refused at 10.0.0.3")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert_eq!(body["message"], "An internal error occurred");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_headers() {
        let err = ApiError::RateLimitExceeded {
            retry_after: 17,
            limit: 20,
            message: "Too many requests".to_string(),
        };
        let (status, body, headers) = body_json(err).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(headers.get("Retry-After").unwrap(), "17");
        assert_eq!(headers.get("X-RateLimit-Limit").unwrap(), "20");
        assert_eq!(headers.get("X-RateLimit-Remaining").unwrap(), "0");
    }

    #[test]
    fn test_jwt_errors_map_to_codes() {
        assert_eq!(ApiError::from(JwtError::Expired).code(), "TOKEN_EXPIRED");
        assert_eq!(ApiError::from(JwtError::Invalid("bad".into())).code(), "TOKEN_INVALID");
        assert_eq!(
            ApiError::from(JwtError::WrongType { expected: "access" }).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_domain_errors_map_to_codes() {
        let err = ApiError::from(CreditError::Insufficient { balance: 0, required: 1 });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "INSUFFICIENT_CREDITS");

        let err = ApiError::from(AuthzError::AdminRequired);
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "FORBIDDEN");

        assert_eq!(ApiError::from(sqlx::Error::RowNotFound).code(), "NOT_FOUND");
        assert_eq!(ApiError::from(AuthError::MissingCredentials).code(), "UNAUTHORIZED");
    }

    #[derive(Validate)]
    struct Sample {
        #[validate(email(message = "Invalid email format"))]
        email: String,
        #[validate(length(min = 8))]
        password: String,
    }

    #[test]
    fn test_from_validation_errors() {
        let sample = Sample {
            email: "nope".to_string(),
            password: "short".to_string(),
        };
        let ApiError::ValidationError(details) = ApiError::from(sample.validate().unwrap_err()) else {
            panic!("expected validation error");
        };
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].field, "email");
        assert_eq!(details[0].message, "Invalid email format");
        assert_eq!(details[1].field, "password");
        assert_eq!(details[1].message, "Invalid value (length)");
    }
}
