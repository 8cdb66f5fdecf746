/// Maintenance tasks run by the sweeper
///
/// Each task is one idempotent statement (or a short sequence) against the
/// database and reports how many rows it touched. A failing task is logged
/// by the sweeper and retried on the next sweep; it never stops the others.
///
/// # Example
///
/// ```no_run
/// use mockmate_worker::tasks::MaintenanceTask;
/// use async_trait::async_trait;
/// use sqlx::PgPool;
///
/// struct VacuumAnalyze;
///
/// #[async_trait]
/// impl MaintenanceTask for VacuumAnalyze {
///     fn name(&self) -> &'static str {
///         "vacuum_analyze"
///     }
///
///     async fn run(&self, pool: &PgPool) -> Result<u64, sqlx::Error> {
///         sqlx::query("ANALYZE").execute(pool).await?;
///         Ok(0)
///     }
/// }
/// ```

use crate::config::WorkerConfig;
use async_trait::async_trait;
use chrono::Duration;
use mockmate_shared::models::{
    alert::{Alert, AlertSeverity, CreateAlert},
    email_verification_token::EmailVerificationToken,
    interview_session::InterviewSession,
    otp_code::OtpCode,
    password_reset_token::PasswordResetToken,
    payment::Payment,
};
use sqlx::PgPool;
use std::sync::Arc;

#[async_trait]
pub trait MaintenanceTask: Send + Sync {
    /// Stable name used in logs and sweep reports
    fn name(&self) -> &'static str;

    /// Runs the task once and returns the number of affected rows
    async fn run(&self, pool: &PgPool) -> Result<u64, sqlx::Error>;
}

/// Deletes OTP codes that expired or were used
pub struct PurgeOtpCodes {
    pub retention: Duration,
}

#[async_trait]
impl MaintenanceTask for PurgeOtpCodes {
    fn name(&self) -> &'static str {
        "purge_otp_codes"
    }

    async fn run(&self, pool: &PgPool) -> Result<u64, sqlx::Error> {
        OtpCode::purge_stale(pool, self.retention).await
    }
}

/// Deletes spent or expired email verification links
pub struct PurgeVerificationTokens {
    pub retention: Duration,
}

#[async_trait]
impl MaintenanceTask for PurgeVerificationTokens {
    fn name(&self) -> &'static str {
        "purge_verification_tokens"
    }

    async fn run(&self, pool: &PgPool) -> Result<u64, sqlx::Error> {
        EmailVerificationToken::purge_stale(pool, self.retention).await
    }
}

/// Deletes spent or expired password reset links
pub struct PurgeResetTokens {
    pub retention: Duration,
}

#[async_trait]
impl MaintenanceTask for PurgeResetTokens {
    fn name(&self) -> &'static str {
        "purge_reset_tokens"
    }

    async fn run(&self, pool: &PgPool) -> Result<u64, sqlx::Error> {
        PasswordResetToken::purge_stale(pool, self.retention).await
    }
}

/// Deletes alerts past their `expires_at`
pub struct DeleteExpiredAlerts;

#[async_trait]
impl MaintenanceTask for DeleteExpiredAlerts {
    fn name(&self) -> &'static str {
        "delete_expired_alerts"
    }

    async fn run(&self, pool: &PgPool) -> Result<u64, sqlx::Error> {
        Alert::delete_expired(pool).await
    }
}

/// Marks in-progress interviews without activity as abandoned
///
/// The candidate gets an alert for each one; the session credit is not
/// refunded since the interview did start.
pub struct AbandonStaleSessions {
    pub idle_for: Duration,
}

#[async_trait]
impl MaintenanceTask for AbandonStaleSessions {
    fn name(&self) -> &'static str {
        "abandon_stale_sessions"
    }

    async fn run(&self, pool: &PgPool) -> Result<u64, sqlx::Error> {
        let abandoned = InterviewSession::abandon_stale(pool, self.idle_for).await?;

        for session in &abandoned {
            let alert = CreateAlert::new(
                session.user_id,
                "Interview closed",
                format!(
                    "\"{}\" was closed after {} minutes without activity.",
                    session.title,
                    self.idle_for.num_minutes()
                ),
            )
            .severity(AlertSeverity::Warning)
            .alert_type("session");

            if let Err(e) = Alert::create(pool, alert).await {
                tracing::warn!(session_id = %session.id, error = %e, "Failed to alert user about abandoned session");
            }
        }

        Ok(abandoned.len() as u64)
    }
}

/// Expires checkouts the provider never confirmed
pub struct ExpirePendingPayments {
    pub older_than: Duration,
}

#[async_trait]
impl MaintenanceTask for ExpirePendingPayments {
    fn name(&self) -> &'static str {
        "expire_pending_payments"
    }

    async fn run(&self, pool: &PgPool) -> Result<u64, sqlx::Error> {
        Payment::expire_stale(pool, self.older_than).await
    }
}

/// The standard task list, in the order they run
pub fn default_tasks(config: &WorkerConfig) -> Vec<Arc<dyn MaintenanceTask>> {
    let retention = config.token_retention();

    vec![
        Arc::new(PurgeOtpCodes { retention }),
        Arc::new(PurgeVerificationTokens { retention }),
        Arc::new(PurgeResetTokens { retention }),
        Arc::new(DeleteExpiredAlerts),
        Arc::new(AbandonStaleSessions {
            idle_for: config.stale_session_after(),
        }),
        Arc::new(ExpirePendingPayments {
            older_than: config.pending_payment_after(),
        }),
    ]
}
