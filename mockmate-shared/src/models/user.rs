/// User accounts
///
/// Users sign up with an email and password (or an emailed one-time code),
/// hold a balance of interview credits and carry a platform role. Emails are
/// unique case-insensitively (`users_email_unique` on `LOWER(email)`) and are
/// stored lowercased.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE user_role AS ENUM ('user', 'admin');
///
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email VARCHAR(255) NOT NULL,
///     password_hash VARCHAR(255) NOT NULL,
///     name VARCHAR(255),
///     phone VARCHAR(32),
///     avatar_url VARCHAR(512),
///     role user_role NOT NULL DEFAULT 'user',
///     status VARCHAR(20) NOT NULL DEFAULT 'active',
///     email_verified BOOLEAN NOT NULL DEFAULT FALSE,
///     credits INTEGER NOT NULL DEFAULT 0 CHECK (credits >= 0),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_login_at TIMESTAMPTZ
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use mockmate_shared::models::user::{CreateUser, User};
/// use mockmate_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let user = User::create(&pool, CreateUser::new("Ada@Example.com", "$argon2id$...")).await?;
/// assert_eq!(user.email, "ada@example.com");
///
/// let found = User::find_by_email(&pool, "ADA@example.com").await?;
/// assert!(found.is_some());
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Platform-wide role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

/// Account status stored in `users.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Suspended,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(UserStatus::Active),
            "suspended" => Some(UserStatus::Suspended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,

    /// Argon2id PHC string, never serialized
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    pub name: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub role: UserRole,
    pub status: String,
    pub email_verified: bool,

    /// Remaining interview credits
    pub credits: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn get_status(&self) -> Option<UserStatus> {
        UserStatus::parse(&self.status)
    }

    pub fn is_active(&self) -> bool {
        self.get_status() == Some(UserStatus::Active)
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Input for creating a user
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: UserRole,
    pub email_verified: bool,
}

impl CreateUser {
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password_hash: password_hash.into(),
            name: None,
            phone: None,
            role: UserRole::User,
            email_verified: false,
        }
    }
}

/// Partial update applied by the profile and admin endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    pub email_verified: Option<bool>,
}

/// Filters for the admin user listing
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Substring match on email or name
    pub search: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
}

/// Aggregates for the admin dashboard
#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
pub struct UserCounts {
    pub total: i64,
    pub new_last_7_days: i64,
    pub verified: i64,
    pub admins: i64,
    pub suspended: i64,
}

/// Row counts removed by [`User::purge_data`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct PurgeSummary {
    pub sessions: u64,
    pub resumes: u64,
    pub alerts: u64,
    pub tokens: u64,
    pub account_deleted: bool,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl User {
    /// Inserts a user; the email is normalized to lowercase
    ///
    /// # Errors
    ///
    /// A duplicate email fails with a unique violation on `users_email_unique`.
    pub async fn create<'e, E: PgExecutor<'e>>(executor: E, data: CreateUser) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, name, phone, role, email_verified)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(normalize_email(&data.email))
        .bind(&data.password_hash)
        .bind(&data.name)
        .bind(&data.phone)
        .bind(data.role)
        .bind(data.email_verified)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email.trim())
            .fetch_optional(pool)
            .await
    }

    pub async fn email_exists(pool: &PgPool, email: &str) -> Result<bool, sqlx::Error> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1))")
                .bind(email.trim())
                .fetch_one(pool)
                .await?;
        Ok(exists)
    }

    /// Lists users newest first
    pub async fn list(
        pool: &PgPool,
        filter: &UserFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE ($1::TEXT IS NULL OR email ILIKE '%' || $1 || '%' OR name ILIKE '%' || $1 || '%')
              AND ($2::user_role IS NULL OR role = $2)
              AND ($3::TEXT IS NULL OR status = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(&filter.search)
        .bind(filter.role)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn count(pool: &PgPool, filter: &UserFilter) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM users
            WHERE ($1::TEXT IS NULL OR email ILIKE '%' || $1 || '%' OR name ILIKE '%' || $1 || '%')
              AND ($2::user_role IS NULL OR role = $2)
              AND ($3::TEXT IS NULL OR status = $3)
            "#,
        )
        .bind(&filter.search)
        .bind(filter.role)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_one(pool)
        .await
    }

    pub async fn counts(pool: &PgPool) -> Result<UserCounts, sqlx::Error> {
        sqlx::query_as::<_, UserCounts>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE created_at > NOW() - INTERVAL '7 days') AS new_last_7_days,
                COUNT(*) FILTER (WHERE email_verified) AS verified,
                COUNT(*) FILTER (WHERE role = 'admin') AS admins,
                COUNT(*) FILTER (WHERE status = 'suspended') AS suspended
            FROM users
            "#,
        )
        .fetch_one(pool)
        .await
    }

    /// Applies a partial update; fields left as `None` are untouched
    ///
    /// Returns `None` if the user does not exist.
    pub async fn update(pool: &PgPool, id: Uuid, data: UpdateUser) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE users SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.phone.is_some() {
            bind_count += 1;
            query.push_str(&format!(", phone = ${}", bind_count));
        }
        if data.avatar_url.is_some() {
            bind_count += 1;
            query.push_str(&format!(", avatar_url = ${}", bind_count));
        }
        if data.role.is_some() {
            bind_count += 1;
            query.push_str(&format!(", role = ${}", bind_count));
        }
        if data.status.is_some() {
            bind_count += 1;
            query.push_str(&format!(", status = ${}", bind_count));
        }
        if data.email_verified.is_some() {
            bind_count += 1;
            query.push_str(&format!(", email_verified = ${}", bind_count));
        }

        query.push_str(" WHERE id = $1 RETURNING *");

        let mut q = sqlx::query_as::<_, User>(&query).bind(id);

        if let Some(name) = data.name {
            q = q.bind(name);
        }
        if let Some(phone) = data.phone {
            q = q.bind(phone);
        }
        if let Some(avatar_url) = data.avatar_url {
            q = q.bind(avatar_url);
        }
        if let Some(role) = data.role {
            q = q.bind(role);
        }
        if let Some(status) = data.status {
            q = q.bind(status.as_str());
        }
        if let Some(email_verified) = data.email_verified {
            q = q.bind(email_verified);
        }

        q.fetch_optional(pool).await
    }

    pub async fn update_password<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_email_verified<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET email_verified = TRUE, updated_at = NOW() WHERE id = $1 AND email_verified = FALSE",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn record_login(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Removes a user's interview data in one transaction
    ///
    /// Sessions (with their messages), resumes, alerts, one-time codes and
    /// verification/reset tokens are deleted. With `delete_account` the user
    /// row goes too, which cascades to memberships, payments and the credit
    /// ledger; otherwise the account stays usable with its balance intact.
    pub async fn purge_data(pool: &PgPool, id: Uuid, delete_account: bool) -> Result<Option<PurgeSummary>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let email: Option<String> = sqlx::query_scalar("SELECT email FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(email) = email else {
            tx.rollback().await?;
            return Ok(None);
        };

        let mut summary = PurgeSummary::default();

        summary.sessions = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        summary.resumes = sqlx::query("DELETE FROM user_resumes WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        summary.alerts = sqlx::query("DELETE FROM alerts WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        summary.tokens += sqlx::query("DELETE FROM email_verification_tokens WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        summary.tokens += sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        summary.tokens += sqlx::query("DELETE FROM otp_codes WHERE identifier = $1")
            .bind(&email)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if delete_account {
            sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            summary.account_deleted = true;
        }

        tx.commit().await?;

        tracing::info!(
            user_id = %id,
            sessions = summary.sessions,
            resumes = summary.resumes,
            account_deleted = summary.account_deleted,
            "Purged user data"
        );

        Ok(Some(summary))
    }
}
