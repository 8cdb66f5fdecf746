/// Database models for MockMate
///
/// Each model owns its SQL: rows are plain structs deriving `sqlx::FromRow`,
/// and CRUD lives in associated `async fn`s taking a `&PgPool` (or a generic
/// `PgExecutor` where the call must also run inside a transaction).
///
/// # Models
///
/// - `user`: accounts, roles, credit balance
/// - `tenant`, `tenant_user`, `tenant_api_key`: multi-tenancy
/// - `interview_session`, `interview_message`, `user_resume`: interviews
/// - `payment`, `credit_transaction`: purchases and the credit ledger
/// - `system_config`: dynamic configuration rows
/// - `alert`: per-user notifications
/// - `otp_code`, `email_verification_token`, `password_reset_token`: time-limited secrets
/// - `email_template`, `firebase_rules_template`, `auth_provider_config`: admin-managed content
/// - `activity_log`: audit trail
///
/// # Example
///
/// ```no_run
/// use mockmate_shared::models::user::{User, CreateUser};
/// use mockmate_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let mut new_user = CreateUser::new("user@example.com", "$argon2id$...");
/// new_user.name = Some("Jane Doe".to_string());
///
/// let user = User::create(&pool, new_user).await?;
/// # Ok(())
/// # }
/// ```

pub mod activity_log;
pub mod alert;
pub mod auth_provider_config;
pub mod credit_transaction;
pub mod email_template;
pub mod email_verification_token;
pub mod firebase_rules_template;
pub mod interview_message;
pub mod interview_session;
pub mod otp_code;
pub mod password_reset_token;
pub mod payment;
pub mod system_config;
pub mod tenant;
pub mod tenant_api_key;
pub mod tenant_user;
pub mod user;
pub mod user_resume;
