/// User alerts (notifications)
///
/// Alerts are stored one row per recipient. A broadcast to all users, or to
/// every member of a tenant, fans out with a single `INSERT ... SELECT` so each
/// recipient gets an independent read flag. Alerts past `expires_at` are
/// hidden from listings and purged by the worker.
///
/// # Example
///
/// ```no_run
/// use mockmate_shared::models::alert::{Alert, AlertSeverity, CreateAlert};
/// use mockmate_shared::db::pool::{create_pool, DatabaseConfig};
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
/// let user_id = Uuid::new_v4();
///
/// Alert::create(&pool, CreateAlert::new(user_id, "Credits added", "5 credits were added")).await?;
/// assert_eq!(Alert::unread_count(&pool, user_id).await?, 1);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Success,
    Warning,
    Error,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Success => "success",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Error => "error",
        }
    }
}

impl Default for AlertSeverity {
    fn default() -> Self {
        AlertSeverity::Info
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Alert {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub severity: String,

    /// Free-form category, e.g. `system`, `payment`, `session`
    pub alert_type: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAlert {
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub alert_type: String,
    pub created_by: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CreateAlert {
    pub fn new(user_id: Uuid, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id,
            tenant_id: None,
            title: title.into(),
            message: message.into(),
            severity: AlertSeverity::Info,
            alert_type: "system".to_string(),
            created_by: None,
            expires_at: None,
        }
    }

    pub fn severity(mut self, severity: AlertSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn alert_type(mut self, alert_type: impl Into<String>) -> Self {
        self.alert_type = alert_type.into();
        self
    }
}

/// Who receives a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertAudience {
    /// Every active user
    AllUsers,
    /// Every member of a tenant
    Tenant(Uuid),
}

#[derive(Debug, Clone)]
pub struct BroadcastAlert {
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub alert_type: String,
    pub created_by: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

const VISIBLE: &str = "(expires_at IS NULL OR expires_at > NOW())";

impl Alert {
    pub async fn create(pool: &PgPool, data: CreateAlert) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            r#"
            INSERT INTO alerts (user_id, tenant_id, title, message, severity, alert_type, created_by, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(data.user_id)
        .bind(data.tenant_id)
        .bind(&data.title)
        .bind(&data.message)
        .bind(data.severity.as_str())
        .bind(&data.alert_type)
        .bind(data.created_by)
        .bind(data.expires_at)
        .fetch_one(pool)
        .await
    }

    /// Inserts one alert row per recipient and returns them all
    pub async fn broadcast(
        pool: &PgPool,
        audience: AlertAudience,
        data: BroadcastAlert,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let tenant_id = match audience {
            AlertAudience::AllUsers => None,
            AlertAudience::Tenant(id) => Some(id),
        };

        sqlx::query_as::<_, Alert>(
            r#"
            INSERT INTO alerts (user_id, tenant_id, title, message, severity, alert_type, created_by, expires_at)
            SELECT u.id, $1, $2, $3, $4, $5, $6, $7
            FROM users u
            WHERE u.status = 'active'
              AND ($1::UUID IS NULL OR EXISTS (
                    SELECT 1 FROM tenant_users tu WHERE tu.tenant_id = $1 AND tu.user_id = u.id))
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(&data.title)
        .bind(&data.message)
        .bind(data.severity.as_str())
        .bind(&data.alert_type)
        .bind(data.created_by)
        .bind(data.expires_at)
        .fetch_all(pool)
        .await
    }

    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(&format!(
            r#"
            SELECT * FROM alerts
            WHERE user_id = $1 AND {VISIBLE} AND (NOT $2 OR is_read = FALSE)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn unread_count(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM alerts WHERE user_id = $1 AND is_read = FALSE AND {VISIBLE}"
        ))
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// Marks one of the user's alerts read; `None` if it isn't theirs
    pub async fn mark_read(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            r#"
            UPDATE alerts SET is_read = TRUE, read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn mark_all_read(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE alerts SET is_read = TRUE, read_at = NOW() WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_for_user(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM alerts WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Admin listing across all users
    pub async fn list_all(
        pool: &PgPool,
        user_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            r#"
            SELECT * FROM alerts
            WHERE ($1::UUID IS NULL OR user_id = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>("DELETE FROM alerts WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM alerts WHERE expires_at IS NOT NULL AND expires_at <= NOW()")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
