/// Password reset links
///
/// Same shape as [`super::email_verification_token`]. Redeeming a token sets
/// the new password hash, marks the token used and invalidates every other
/// outstanding reset token for the user, all in one transaction.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::email_verification_token::LinkTokenRejection;
use super::user::User;
use crate::auth::tokens::{hash_secret, random_token, LINK_TOKEN_LENGTH};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub user_id: Uuid,

    #[serde(skip_serializing, default)]
    pub token_hash: String,

    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PasswordResetToken {
    /// Creates a token and returns it with its plaintext
    pub async fn create(pool: &PgPool, user_id: Uuid, ttl: Duration) -> Result<(Self, String), sqlx::Error> {
        let plaintext = random_token(LINK_TOKEN_LENGTH);

        let token = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            INSERT INTO password_reset_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(hash_secret(&plaintext))
        .bind(Utc::now() + ttl)
        .fetch_one(pool)
        .await?;

        Ok((token, plaintext))
    }

    /// Redeems a token, replacing the user's password hash
    pub async fn redeem(
        pool: &PgPool,
        plaintext: &str,
        new_password_hash: &str,
    ) -> Result<Result<Uuid, LinkTokenRejection>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let token = sqlx::query_as::<_, PasswordResetToken>(
            "SELECT * FROM password_reset_tokens WHERE token_hash = $1 FOR UPDATE",
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

        if !User::update_password(&mut *tx, token.user_id, new_password_hash).await? {
            return Ok(Err(LinkTokenRejection::Unknown));
        }

        sqlx::query("UPDATE password_reset_tokens SET used_at = NOW() WHERE user_id = $1 AND used_at IS NULL")
            .bind(token.user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(user_id = %token.user_id, "Password reset completed");
        Ok(Ok(token.user_id))
    }

    pub async fn purge_stale(pool: &PgPool, retention: Duration) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at < $1 OR used_at < $1")
            .bind(Utc::now() - retention)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
