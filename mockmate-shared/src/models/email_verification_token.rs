/// Email verification links
///
/// Each token is a 32-character random string mailed to the user; only its
/// SHA-256 digest is stored. Consuming a token marks it used and flips
/// `users.email_verified` in the same transaction.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::user::User;
use crate::auth::tokens::{hash_secret, random_token, LINK_TOKEN_LENGTH};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmailVerificationToken {
    pub id: Uuid,
    pub user_id: Uuid,

    #[serde(skip_serializing, default)]
    pub token_hash: String,

    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Why a link could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTokenRejection {
    Unknown,
    Used,
    Expired,
}

impl EmailVerificationToken {
    /// Creates a token and returns it with its plaintext
    ///
    /// Earlier unused tokens for the user are invalidated.
    pub async fn create(pool: &PgPool, user_id: Uuid, ttl: Duration) -> Result<(Self, String), sqlx::Error> {
        let plaintext = random_token(LINK_TOKEN_LENGTH);
        let mut tx = pool.begin().await?;

        sqlx::query("UPDATE email_verification_tokens SET used_at = NOW() WHERE user_id = $1 AND used_at IS NULL")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let token = sqlx::query_as::<_, EmailVerificationToken>(
            r#"
            INSERT INTO email_verification_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(hash_secret(&plaintext))
        .bind(Utc::now() + ttl)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((token, plaintext))
    }

    /// Consumes a token and marks the owner's email verified
    ///
    /// Returns the updated user, or the reason the token was rejected.
    pub async fn consume(pool: &PgPool, plaintext: &str) -> Result<Result<User, LinkTokenRejection>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let token = sqlx::query_as::<_, EmailVerificationToken>(
            "SELECT * FROM email_verification_tokens WHERE token_hash = $1 FOR UPDATE",
        )
        .bind(hash_secret(plaintext.trim()))
        .fetch_optional(&mut *tx)
        .await?;

        let token = match token {
            None => return Ok(Err(LinkTokenRejection::Unknown)),
            Some(t) if t.used_at.is_some() => return Ok(Err(LinkTokenRejection::Used)),
            Some(t) if t.expires_at <= Utc::now() => return Ok(Err(LinkTokenRejection::Expired)),
            Some(t) => t,
        };

        sqlx::query("UPDATE email_verification_tokens SET used_at = NOW() WHERE id = $1")
            .bind(token.id)
            .execute(&mut *tx)
            .await?;

        User::mark_email_verified(&mut *tx, token.user_id).await?;

        let user = User::find_by_id(&mut *tx, token.user_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        tx.commit().await?;
        Ok(Ok(user))
    }

    /// Latest token for a user, used for the status endpoint
    pub async fn latest_for_user(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, EmailVerificationToken>(
            "SELECT * FROM email_verification_tokens WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn purge_stale(pool: &PgPool, retention: Duration) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM email_verification_tokens WHERE expires_at < $1 OR used_at < $1",
        )
        .bind(Utc::now() - retention)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
