/// Credit purchases
///
/// A payment row is created `pending` when the user starts checkout for a
/// credit package and moves to `paid`, `failed` or `expired`. Fulfilment
/// ([`Payment::fulfil`]) is the only path that credits the account.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE payments (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     provider VARCHAR(30) NOT NULL,
///     order_id VARCHAR(64) NOT NULL UNIQUE,
///     provider_order_id VARCHAR(255),
///     provider_payment_id VARCHAR(255),
///     package_id VARCHAR(64) NOT NULL,
///     amount_minor BIGINT NOT NULL,
///     currency VARCHAR(3) NOT NULL,
///     credits INTEGER NOT NULL,
///     status VARCHAR(20) NOT NULL DEFAULT 'pending',
///     checkout_url TEXT,
///     metadata JSONB NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     paid_at TIMESTAMPTZ
/// );
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use super::credit_transaction::{CreditError, CreditKind, CreditTransaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Expired,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            "failed" => Some(PaymentStatus::Failed),
            "expired" => Some(PaymentStatus::Expired),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,

    /// Our order reference, sent to the provider
    pub order_id: String,
    pub provider_order_id: Option<String>,
    pub provider_payment_id: Option<String>,
    pub package_id: String,

    /// Amount in minor units (paise, cents)
    pub amount_minor: i64,
    pub currency: String,
    pub credits: i32,
    pub status: String,
    pub checkout_url: Option<String>,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub user_id: Uuid,
    pub provider: String,
    pub order_id: String,
    pub package_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub credits: i32,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<PaymentStatus>,
}

/// Paid revenue grouped by currency
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RevenueByCurrency {
    pub currency: String,
    pub total_minor: i64,
    pub payments: i64,
}

/// Result of [`Payment::fulfil`]
#[derive(Debug, Clone)]
pub enum Fulfilment {
    /// Credits were granted by this call
    Credited { payment: Payment, balance: i32 },
    /// The payment had already been fulfilled
    AlreadyPaid(Payment),
    /// The payment is no longer pending (failed, expired, refunded)
    NotPending(Payment),
}

impl Fulfilment {
    pub fn payment(&self) -> &Payment {
        match self {
            Fulfilment::Credited { payment, .. } => payment,
            Fulfilment::AlreadyPaid(payment) | Fulfilment::NotPending(payment) => payment,
        }
    }
}

/// Builds a new order reference, e.g. `mm_ord_1f0c3a...`
pub fn new_order_id() -> String {
    format!("mm_ord_{}", Uuid::new_v4().simple())
}

impl Payment {
    pub fn get_status(&self) -> Option<PaymentStatus> {
        PaymentStatus::parse(&self.status)
    }

    pub async fn create(pool: &PgPool, data: CreatePayment) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (user_id, provider, order_id, package_id, amount_minor, currency, credits)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(data.user_id)
        .bind(&data.provider)
        .bind(&data.order_id)
        .bind(&data.package_id)
        .bind(data.amount_minor)
        .bind(&data.currency)
        .bind(data.credits)
        .fetch_one(pool)
        .await
    }

    /// Records the provider's order reference and checkout URL
    pub async fn attach_provider_order(
        pool: &PgPool,
        id: Uuid,
        provider_order_id: &str,
        checkout_url: Option<&str>,
        metadata: JsonValue,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET provider_order_id = $2, checkout_url = $3, metadata = metadata || $4, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(provider_order_id)
        .bind(checkout_url)
        .bind(metadata)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_order_id(pool: &PgPool, order_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(pool)
            .await
    }

    /// Looks up by our order id or, failing that, the provider's order/session id
    pub async fn find_by_any_reference(pool: &PgPool, reference: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE order_id = $1 OR provider_order_id = $1 LIMIT 1",
        )
        .bind(reference)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(
        pool: &PgPool,
        filter: &PaymentFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE ($1::UUID IS NULL OR user_id = $1)
              AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn count(pool: &PgPool, filter: &PaymentFilter) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM payments
            WHERE ($1::UUID IS NULL OR user_id = $1)
              AND ($2::TEXT IS NULL OR status = $2)
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_one(pool)
        .await
    }

    /// Moves a pending payment to a non-paid terminal status
    pub async fn mark_unpaid(pool: &PgPool, id: Uuid, status: PaymentStatus) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(pool)
        .await
    }

    /// Marks the payment paid and credits the user, exactly once
    ///
    /// The payment row is locked with `FOR UPDATE`, so concurrent webhook
    /// deliveries and client-side verifications serialize here; whichever
    /// arrives second sees `AlreadyPaid`.
    pub async fn fulfil(
        pool: &PgPool,
        order_id: &str,
        provider_payment_id: Option<&str>,
    ) -> Result<Option<Fulfilment>, CreditError> {
        let mut tx = pool.begin().await?;

        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE order_id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(payment) = payment else {
            tx.rollback().await?;
            return Ok(None);
        };

        match payment.get_status() {
            Some(PaymentStatus::Pending) => {}
            Some(PaymentStatus::Paid) => {
                tx.rollback().await?;
                return Ok(Some(Fulfilment::AlreadyPaid(payment)));
            }
            _ => {
                tx.rollback().await?;
                return Ok(Some(Fulfilment::NotPending(payment)));
            }
        }

        let paid = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'paid', provider_payment_id = COALESCE($2, provider_payment_id),
                paid_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(payment.id)
        .bind(provider_payment_id)
        .fetch_one(&mut *tx)
        .await?;

        let entry = CreditTransaction::apply(
            &mut tx,
            paid.user_id,
            paid.credits,
            CreditKind::Purchase,
            Some(&paid.order_id),
            Some(&format!("Credit package {}", paid.package_id)),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %paid.order_id,
            user_id = %paid.user_id,
            credits = paid.credits,
            balance = entry.balance_after,
            "Payment fulfilled"
        );

        Ok(Some(Fulfilment::Credited {
            payment: paid,
            balance: entry.balance_after,
        }))
    }

    /// Expires checkouts left pending for longer than `older_than`
    pub async fn expire_stale(pool: &PgPool, older_than: Duration) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE payments SET status = 'expired', updated_at = NOW() WHERE status = 'pending' AND created_at < $1",
        )
        .bind(Utc::now() - older_than)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn revenue_by_currency(pool: &PgPool) -> Result<Vec<RevenueByCurrency>, sqlx::Error> {
        sqlx::query_as::<_, RevenueByCurrency>(
            r#"
            SELECT currency, COALESCE(SUM(amount_minor), 0)::BIGINT AS total_minor, COUNT(*) AS payments
            FROM payments
            WHERE status = 'paid'
            GROUP BY currency
            ORDER BY currency
            "#,
        )
        .fetch_all(pool)
        .await
    }
}
