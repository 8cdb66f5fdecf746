/// One-time numeric codes
///
/// Codes are sent to an identifier (an email address or phone number) for a
/// purpose and stored as SHA-256 digests. Issuing a code consumes every
/// earlier unconsumed code for the same identifier and purpose, and a resend
/// cooldown applies. Verification locks the row with `SELECT ... FOR UPDATE`,
/// counts failed attempts and locks the code once `max_attempts` is reached.
///
/// # Example
///
/// ```no_run
/// use mockmate_shared::models::otp_code::{IssueOutcome, OtpCode, OtpPolicy, OtpPurpose, OtpVerification};
/// use mockmate_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
/// let policy = OtpPolicy::default();
///
/// if let IssueOutcome::Issued { code, .. } =
///     OtpCode::issue(&pool, "ada@example.com", OtpPurpose::Login, &policy).await?
/// {
///     let result = OtpCode::verify(&pool, "ada@example.com", OtpPurpose::Login, &code).await?;
///     assert!(matches!(result, OtpVerification::Valid(_)));
/// }
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::tokens::{hash_secret, numeric_code, verify_secret};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Login,
    VerifyEmail,
    VerifyPhone,
    PasswordReset,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Login => "login",
            OtpPurpose::VerifyEmail => "verify_email",
            OtpPurpose::VerifyPhone => "verify_phone",
            OtpPurpose::PasswordReset => "password_reset",
        }
    }
}

/// Issuance parameters, normally read from dynamic config
#[derive(Debug, Clone, Copy)]
pub struct OtpPolicy {
    pub length: usize,
    pub ttl: Duration,
    pub max_attempts: i32,
    pub cooldown: Duration,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            length: 6,
            ttl: Duration::minutes(5),
            max_attempts: 5,
            cooldown: Duration::seconds(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OtpCode {
    pub id: Uuid,
    pub identifier: String,
    pub purpose: String,

    #[serde(skip_serializing, default)]
    pub code_hash: String,

    pub attempts: i32,
    pub max_attempts: i32,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum IssueOutcome {
    /// A new code; the plaintext must be delivered and then dropped
    Issued { code: String, expires_at: DateTime<Utc> },
    /// A code was issued too recently
    Cooldown { retry_after_secs: i64 },
}

#[derive(Debug, Clone)]
pub enum OtpVerification {
    Valid(OtpCode),
    Invalid { remaining_attempts: i32 },
    Expired,
    Locked,
    NotFound,
}

/// Normalizes emails to lowercase; phone numbers lose spaces and dashes
pub fn normalize_identifier(identifier: &str) -> String {
    let trimmed = identifier.trim();
    if trimmed.contains('@') {
        trimmed.to_lowercase()
    } else {
        trimmed.chars().filter(|c| !c.is_whitespace() && *c != '-').collect()
    }
}

impl OtpCode {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub fn is_locked(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Issues a new code, superseding earlier ones, unless within the cooldown
    pub async fn issue(
        pool: &PgPool,
        identifier: &str,
        purpose: OtpPurpose,
        policy: &OtpPolicy,
    ) -> Result<IssueOutcome, sqlx::Error> {
        let identifier = normalize_identifier(identifier);
        let mut tx = pool.begin().await?;

        // Serializes concurrent issues for the same identifier and purpose
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("otp:{}:{}", purpose.as_str(), identifier))
            .execute(&mut *tx)
            .await?;

        let last_issued: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            SELECT created_at FROM otp_codes
            WHERE identifier = $1 AND purpose = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(&identifier)
        .bind(purpose.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(retry_after_secs) = last_issued.and_then(|at| cooldown_remaining(at, policy.cooldown, Utc::now())) {
            tx.rollback().await?;
            return Ok(IssueOutcome::Cooldown { retry_after_secs });
        }

        sqlx::query(
            r#"
            UPDATE otp_codes SET consumed_at = NOW()
            WHERE identifier = $1 AND purpose = $2 AND consumed_at IS NULL
            "#,
        )
        .bind(&identifier)
        .bind(purpose.as_str())
        .execute(&mut *tx)
        .await?;

        let code = numeric_code(policy.length);
        let expires_at = Utc::now() + policy.ttl;

        sqlx::query(
            r#"
            INSERT INTO otp_codes (identifier, purpose, code_hash, max_attempts, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&identifier)
        .bind(purpose.as_str())
        .bind(hash_secret(&code))
        .bind(policy.max_attempts)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(IssueOutcome::Issued { code, expires_at })
    }

    /// Checks a code against the newest unconsumed code for the identifier
    pub async fn verify(
        pool: &PgPool,
        identifier: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<OtpVerification, sqlx::Error> {
        let identifier = normalize_identifier(identifier);
        let mut tx = pool.begin().await?;

        let current = sqlx::query_as::<_, OtpCode>(
            r#"
            SELECT * FROM otp_codes
            WHERE identifier = $1 AND purpose = $2 AND consumed_at IS NULL
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(&identifier)
        .bind(purpose.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            tx.rollback().await?;
            return Ok(OtpVerification::NotFound);
        };

        if current.is_expired() {
            tx.rollback().await?;
            return Ok(OtpVerification::Expired);
        }

        if current.is_locked() {
            tx.rollback().await?;
            return Ok(OtpVerification::Locked);
        }

        if verify_secret(code.trim(), &current.code_hash) {
            let consumed = sqlx::query_as::<_, OtpCode>(
                "UPDATE otp_codes SET consumed_at = NOW() WHERE id = $1 RETURNING *",
            )
            .bind(current.id)
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(OtpVerification::Valid(consumed));
        }

        let attempts: i32 = sqlx::query_scalar(
            "UPDATE otp_codes SET attempts = attempts + 1 WHERE id = $1 RETURNING attempts",
        )
        .bind(current.id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        let remaining_attempts = (current.max_attempts - attempts).max(0);
        if remaining_attempts == 0 {
            Ok(OtpVerification::Locked)
        } else {
            Ok(OtpVerification::Invalid { remaining_attempts })
        }
    }

    /// Deletes codes that expired or were consumed more than `retention` ago
    pub async fn purge_stale(pool: &PgPool, retention: Duration) -> Result<u64, sqlx::Error> {
        let cutoff = Utc::now() - retention;
        let result = sqlx::query(
            "DELETE FROM otp_codes WHERE expires_at < $1 OR (consumed_at IS NOT NULL AND consumed_at < $1)",
        )
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Seconds left in the resend cooldown, if any
fn cooldown_remaining(last_issued: DateTime<Utc>, cooldown: Duration, now: DateTime<Utc>) -> Option<i64> {
    let ready_at = last_issued + cooldown;
    (ready_at > now).then(|| (ready_at - now).num_seconds().max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier(" Ada@Example.com "), "ada@example.com");
        assert_eq!(normalize_identifier("+91 98765-43210"), "+919876543210");
    }

    #[test]
    fn test_cooldown_remaining() {
        let now = Utc::now();
        let cooldown = Duration::seconds(60);

        assert_eq!(cooldown_remaining(now - Duration::seconds(20), cooldown, now), Some(40));
        assert_eq!(cooldown_remaining(now - Duration::seconds(60), cooldown, now), None);
        assert_eq!(cooldown_remaining(now - Duration::seconds(90), cooldown, now), None);
        assert_eq!(
            cooldown_remaining(now - Duration::milliseconds(59_500), cooldown, now),
            Some(1)
        );
    }

    #[test]
    fn test_lock_and_expiry_flags() {
        let code = OtpCode {
            id: Uuid::new_v4(),
            identifier: "a@b.c".into(),
            purpose: "login".into(),
            code_hash: hash_secret("123456"),
            attempts: 5,
            max_attempts: 5,
            expires_at: Utc::now() - Duration::seconds(1),
            consumed_at: None,
            created_at: Utc::now(),
        };
        assert!(code.is_locked());
        assert!(code.is_expired());
    }
}
