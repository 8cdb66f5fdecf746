/// Credit ledger
///
/// Every change to `users.credits` goes through [`CreditTransaction::apply`],
/// which updates the balance and appends a ledger row in the caller's
/// transaction. The balance update is guarded (`credits + amount >= 0`), so
/// concurrent debits cannot overdraw an account.
///
/// `(kind, reference_id)` is unique, which makes purchases and session
/// debits idempotent per order or session.
///
/// # Example
///
/// ```no_run
/// use mockmate_shared::models::credit_transaction::{CreditKind, CreditTransaction};
/// use mockmate_shared::db::pool::{create_pool, DatabaseConfig};
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
/// let mut tx = pool.begin().await?;
///
/// let entry = CreditTransaction::apply(
///     &mut tx,
///     Uuid::new_v4(),
///     5,
///     CreditKind::AdminAdjustment,
///     None,
///     Some("Goodwill credit"),
/// ).await?;
/// tx.commit().await?;
///
/// println!("new balance: {}", entry.balance_after);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Name of the partial unique index on `(kind, reference_id)`
const REFERENCE_UNIQUE: &str = "credit_transactions_reference_unique";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditKind {
    Purchase,
    SessionDebit,
    Refund,
    AdminAdjustment,
    SignupBonus,
}

impl CreditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditKind::Purchase => "purchase",
            CreditKind::SessionDebit => "session_debit",
            CreditKind::Refund => "refund",
            CreditKind::AdminAdjustment => "admin_adjustment",
            CreditKind::SignupBonus => "signup_bonus",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CreditError {
    #[error("Insufficient credits: balance {balance}, required {required}")]
    Insufficient { balance: i32, required: i32 },

    #[error("User {0} not found")]
    UserNotFound(Uuid),

    /// A ledger row with the same kind and reference already exists
    #[error("Credit transaction already recorded for reference {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub user_id: Uuid,

    /// Signed change; negative for debits
    pub amount: i32,
    pub balance_after: i32,
    pub kind: String,
    pub reference_id: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    /// Adjusts a user's balance by `amount` and records the ledger entry
    ///
    /// Must run inside the caller's transaction so the balance change and
    /// whatever triggered it commit together.
    ///
    /// # Errors
    ///
    /// - `Insufficient` when a debit would take the balance below zero
    /// - `UserNotFound` when the user does not exist
    /// - `Duplicate` when `(kind, reference_id)` was already recorded
    pub async fn apply(
        conn: &mut PgConnection,
        user_id: Uuid,
        amount: i32,
        kind: CreditKind,
        reference_id: Option<&str>,
        description: Option<&str>,
    ) -> Result<Self, CreditError> {
        let balance: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET credits = credits + $2, updated_at = NOW()
            WHERE id = $1 AND credits + $2 >= 0
            RETURNING credits
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&mut *conn)
        .await?;

        let balance_after = match balance {
            Some(balance) => balance,
            None => {
                let current: Option<i32> = sqlx::query_scalar("SELECT credits FROM users WHERE id = $1")
                    .bind(user_id)
                    .fetch_optional(&mut *conn)
                    .await?;

                return Err(match current {
                    Some(balance) => CreditError::Insufficient {
                        balance,
                        required: -amount,
                    },
                    None => CreditError::UserNotFound(user_id),
                });
            }
        };

        sqlx::query_as::<_, CreditTransaction>(
            r#"
            INSERT INTO credit_transactions (user_id, amount, balance_after, kind, reference_id, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .bind(balance_after)
        .bind(kind.as_str())
        .bind(reference_id)
        .bind(description)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.constraint() == Some(REFERENCE_UNIQUE) => {
                CreditError::Duplicate(reference_id.unwrap_or_default().to_string())
            }
            _ => CreditError::Database(e),
        })
    }

    /// Applies an adjustment in its own transaction
    pub async fn apply_standalone(
        pool: &PgPool,
        user_id: Uuid,
        amount: i32,
        kind: CreditKind,
        reference_id: Option<&str>,
        description: Option<&str>,
    ) -> Result<Self, CreditError> {
        let mut tx = pool.begin().await?;
        let entry = Self::apply(&mut tx, user_id, amount, kind, reference_id, description).await?;
        tx.commit().await?;
        Ok(entry)
    }

    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, CreditTransaction>(
            r#"
            SELECT * FROM credit_transactions
            WHERE user_id = $1
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

    pub async fn count_for_user(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM credit_transactions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_match_check_constraint() {
        let kinds = [
            CreditKind::Purchase,
            CreditKind::SessionDebit,
            CreditKind::Refund,
            CreditKind::AdminAdjustment,
            CreditKind::SignupBonus,
        ];
        for kind in kinds {
            assert_eq!(serde_json::to_value(kind).unwrap(), kind.as_str());
        }
    }

    #[test]
    fn test_insufficient_message() {
        let err = CreditError::Insufficient { balance: 0, required: 2 };
        assert_eq!(err.to_string(), "Insufficient credits: balance 0, required 2");
    }
}
