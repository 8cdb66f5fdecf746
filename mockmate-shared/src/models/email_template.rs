/// Admin-editable email templates
///
/// A row overrides the built-in template with the same key (see
/// [`crate::email::templates`]). Inactive rows are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmailTemplate {
    pub id: Uuid,
    pub template_key: String,
    pub subject: String,
    pub body_html: String,
    pub body_text: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertEmailTemplate {
    pub subject: String,
    pub body_html: String,
    pub body_text: Option<String>,
    pub is_active: bool,
}

impl EmailTemplate {
    pub async fn find_active(pool: &PgPool, key: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, EmailTemplate>(
            "SELECT * FROM email_templates WHERE template_key = $1 AND is_active",
        )
        .bind(key)
        .fetch_optional(pool)
        .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, EmailTemplate>("SELECT * FROM email_templates ORDER BY template_key")
            .fetch_all(pool)
            .await
    }

    pub async fn upsert(pool: &PgPool, key: &str, data: UpsertEmailTemplate) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, EmailTemplate>(
            r#"
            INSERT INTO email_templates (template_key, subject, body_html, body_text, is_active)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (template_key) DO UPDATE SET
                subject = EXCLUDED.subject,
                body_html = EXCLUDED.body_html,
                body_text = EXCLUDED.body_text,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(key)
        .bind(&data.subject)
        .bind(&data.body_html)
        .bind(&data.body_text)
        .bind(data.is_active)
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM email_templates WHERE template_key = $1")
            .bind(key)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
