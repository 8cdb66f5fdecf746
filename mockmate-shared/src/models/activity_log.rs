/// Append-only activity trail
///
/// Auth, payment, session and admin actions write one row each. Recording
/// is best effort: callers log failures and carry on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub metadata: JsonValue,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewActivity {
    pub user_id: Option<Uuid>,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub metadata: Option<JsonValue>,
    pub ip_address: Option<String>,
}

impl NewActivity {
    pub fn new(user_id: Option<Uuid>, action: impl Into<String>) -> Self {
        Self {
            user_id,
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn entity(mut self, entity_type: &str, entity_id: impl ToString) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self.entity_id = Some(entity_id.to_string());
        self
    }

    pub fn metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn ip(mut self, ip: Option<String>) -> Self {
        self.ip_address = ip;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub user_id: Option<Uuid>,
    /// Prefix match, e.g. `auth.` or `payment.`
    pub action_prefix: Option<String>,
}

impl ActivityLog {
    pub async fn record(pool: &PgPool, entry: NewActivity) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ActivityLog>(
            r#"
            INSERT INTO activity_logs (user_id, action, entity_type, entity_id, metadata, ip_address)
            VALUES ($1, $2, $3, $4, COALESCE($5, '{}'::JSONB), $6)
            RETURNING *
            "#,
        )
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.metadata)
        .bind(&entry.ip_address)
        .fetch_one(pool)
        .await
    }

    /// Records without failing the caller
    pub async fn record_quietly(pool: &PgPool, entry: NewActivity) {
        let action = entry.action.clone();
        if let Err(e) = Self::record(pool, entry).await {
            tracing::warn!(action = %action, error = %e, "Failed to record activity");
        }
    }

    pub async fn list(
        pool: &PgPool,
        filter: &ActivityFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ActivityLog>(
            r#"
            SELECT * FROM activity_logs
            WHERE ($1::UUID IS NULL OR user_id = $1)
              AND ($2::TEXT IS NULL OR action LIKE $2 || '%')
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.user_id)
        .bind(&filter.action_prefix)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn count(pool: &PgPool, filter: &ActivityFilter) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM activity_logs
            WHERE ($1::UUID IS NULL OR user_id = $1)
              AND ($2::TEXT IS NULL OR action LIKE $2 || '%')
            "#,
        )
        .bind(filter.user_id)
        .bind(&filter.action_prefix)
        .fetch_one(pool)
        .await
    }
}
