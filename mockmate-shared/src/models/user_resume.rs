/// Resumes uploaded by users
///
/// Only the extracted text is stored; the interviewer uses it to tailor
/// questions. At most one resume per user is primary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserResume {
    pub id: Uuid,
    pub user_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub content_text: String,
    pub file_size: i64,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateResume {
    pub user_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub content_text: String,
    pub is_primary: bool,
}

impl UserResume {
    /// Stores a resume; a primary upload demotes the previous primary
    pub async fn create(pool: &PgPool, data: CreateResume) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let has_any: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM user_resumes WHERE user_id = $1)")
            .bind(data.user_id)
            .fetch_one(&mut *tx)
            .await?;

        // The first resume is primary regardless of the request
        let is_primary = data.is_primary || !has_any;

        if is_primary {
            sqlx::query("UPDATE user_resumes SET is_primary = FALSE, updated_at = NOW() WHERE user_id = $1 AND is_primary")
                .bind(data.user_id)
                .execute(&mut *tx)
                .await?;
        }

        let resume = sqlx::query_as::<_, UserResume>(
            r#"
            INSERT INTO user_resumes (user_id, file_name, content_type, content_text, file_size, is_primary)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(data.user_id)
        .bind(&data.file_name)
        .bind(&data.content_type)
        .bind(&data.content_text)
        .bind(data.content_text.len() as i64)
        .bind(is_primary)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(resume)
    }

    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, UserResume>(
            "SELECT * FROM user_resumes WHERE user_id = $1 ORDER BY is_primary DESC, created_at DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_for_user(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, UserResume>("SELECT * FROM user_resumes WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, UserResume>("SELECT * FROM user_resumes WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn set_primary(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("UPDATE user_resumes SET is_primary = FALSE, updated_at = NOW() WHERE user_id = $1 AND is_primary")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let resume = sqlx::query_as::<_, UserResume>(
            r#"
            UPDATE user_resumes SET is_primary = TRUE, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        if resume.is_some() {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }
        Ok(resume)
    }

    pub async fn delete_for_user(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_resumes WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
