/// Rows of the `system_config` key/value table
///
/// Reads normally go through [`crate::dynamic_config::ConfigService`], which
/// caches these rows; this module is the raw storage layer.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE system_config (
///     key VARCHAR(128) PRIMARY KEY,
///     value JSONB NOT NULL,
///     category VARCHAR(64) NOT NULL DEFAULT 'general',
///     description TEXT,
///     is_public BOOLEAN NOT NULL DEFAULT FALSE,
///     updated_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SystemConfigEntry {
    pub key: String,
    pub value: JsonValue,
    pub category: String,
    pub description: Option<String>,

    /// Exposed through `/api/config/public`
    pub is_public: bool,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertConfig {
    pub key: String,
    pub value: JsonValue,
    pub category: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
    pub updated_by: Option<Uuid>,
}

impl SystemConfigEntry {
    pub async fn get(pool: &PgPool, key: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, SystemConfigEntry>("SELECT * FROM system_config WHERE key = $1")
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool, category: Option<&str>) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, SystemConfigEntry>(
            "SELECT * FROM system_config WHERE ($1::TEXT IS NULL OR category = $1) ORDER BY category, key",
        )
        .bind(category)
        .fetch_all(pool)
        .await
    }

    pub async fn list_public(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, SystemConfigEntry>("SELECT * FROM system_config WHERE is_public ORDER BY key")
            .fetch_all(pool)
            .await
    }

    /// Inserts or replaces a value; omitted metadata keeps its stored value
    pub async fn upsert(pool: &PgPool, data: UpsertConfig) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, SystemConfigEntry>(
            r#"
            INSERT INTO system_config (key, value, category, description, is_public, updated_by)
            VALUES ($1, $2, COALESCE($3, 'general'), $4, COALESCE($5, FALSE), $6)
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                category = COALESCE($3, system_config.category),
                description = COALESCE($4, system_config.description),
                is_public = COALESCE($5, system_config.is_public),
                updated_by = EXCLUDED.updated_by,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&data.key)
        .bind(&data.value)
        .bind(&data.category)
        .bind(&data.description)
        .bind(data.is_public)
        .bind(data.updated_by)
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM system_config WHERE key = $1")
            .bind(key)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
