/// Plan quotas for tenants
///
/// Each tenant plan caps three resources:
///
/// | plan       | members | API keys | sessions / month |
/// |------------|---------|----------|------------------|
/// | trial      | 3       | 1        | 20               |
/// | starter    | 10      | 3        | 200              |
/// | pro        | 50      | 10       | 2,000            |
/// | enterprise | 1,000   | 100      | 50,000           |
///
/// # Example
///
/// ```no_run
/// use mockmate_shared::quota::{QuotaEnforcer, QuotaType};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, tenant_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let enforcer = QuotaEnforcer::new(pool);
/// enforcer.enforce(tenant_id, QuotaType::ApiKeys).await?;
/// // create the key...
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::interview_session::InterviewSession;
use crate::models::tenant::{Tenant, TenantPlan};
use crate::models::tenant_api_key::TenantApiKey;
use crate::models::tenant_user::TenantUser;

#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error("{kind} limit exceeded ({current}/{limit})", kind = .quota_type.as_str())]
    LimitExceeded {
        quota_type: QuotaType,
        limit: u32,
        current: u32,
    },

    #[error("Tenant not found: {0}")]
    TenantNotFound(Uuid),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaType {
    Members,
    ApiKeys,
    MonthlySessions,
}

impl QuotaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaType::Members => "Tenant members",
            QuotaType::ApiKeys => "API keys",
            QuotaType::MonthlySessions => "Monthly sessions",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaLimits {
    pub members: u32,
    pub api_keys: u32,
    pub monthly_sessions: u32,
}

impl QuotaLimits {
    pub fn for_plan(plan: TenantPlan) -> Self {
        match plan {
            TenantPlan::Trial => QuotaLimits {
                members: 3,
                api_keys: 1,
                monthly_sessions: 20,
            },
            TenantPlan::Starter => QuotaLimits {
                members: 10,
                api_keys: 3,
                monthly_sessions: 200,
            },
            TenantPlan::Pro => QuotaLimits {
                members: 50,
                api_keys: 10,
                monthly_sessions: 2_000,
            },
            TenantPlan::Enterprise => QuotaLimits {
                members: 1_000,
                api_keys: 100,
                monthly_sessions: 50_000,
            },
        }
    }

    pub fn get(&self, quota_type: QuotaType) -> u32 {
        match quota_type {
            QuotaType::Members => self.members,
            QuotaType::ApiKeys => self.api_keys,
            QuotaType::MonthlySessions => self.monthly_sessions,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotaCheckResult {
    pub quota_type: QuotaType,
    /// Whether one more unit fits
    pub allowed: bool,
    pub current: u32,
    pub limit: u32,
    pub remaining: u32,
}

impl QuotaCheckResult {
    pub fn evaluate(quota_type: QuotaType, current: u32, limit: u32) -> Self {
        QuotaCheckResult {
            quota_type,
            allowed: current < limit,
            current,
            limit,
            remaining: limit.saturating_sub(current),
        }
    }
}

/// Midnight UTC on the first day of `now`'s month
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[derive(Clone)]
pub struct QuotaEnforcer {
    db: PgPool,
}

impl QuotaEnforcer {
    pub fn new(db: PgPool) -> Self {
        QuotaEnforcer { db }
    }

    pub async fn check(&self, tenant_id: Uuid, quota_type: QuotaType) -> Result<QuotaCheckResult, QuotaError> {
        let limits = self.get_limits(tenant_id).await?;
        let current = self.current_usage(tenant_id, quota_type).await?;
        Ok(QuotaCheckResult::evaluate(quota_type, current, limits.get(quota_type)))
    }

    /// `Err(LimitExceeded)` when no room is left for one more unit
    pub async fn enforce(&self, tenant_id: Uuid, quota_type: QuotaType) -> Result<(), QuotaError> {
        let result = self.check(tenant_id, quota_type).await?;

        if !result.allowed {
            tracing::info!(
                tenant_id = %tenant_id,
                quota = quota_type.as_str(),
                current = result.current,
                limit = result.limit,
                "Quota exceeded"
            );
            return Err(QuotaError::LimitExceeded {
                quota_type,
                limit: result.limit,
                current: result.current,
            });
        }

        Ok(())
    }

    pub async fn get_limits(&self, tenant_id: Uuid) -> Result<QuotaLimits, QuotaError> {
        let tenant = Tenant::find_by_id(&self.db, tenant_id)
            .await?
            .ok_or(QuotaError::TenantNotFound(tenant_id))?;
        Ok(QuotaLimits::for_plan(tenant.get_plan()))
    }

    /// Usage of all three quotas, for the tenant overview
    pub async fn summary(&self, tenant_id: Uuid) -> Result<Vec<QuotaCheckResult>, QuotaError> {
        let limits = self.get_limits(tenant_id).await?;
        let mut out = Vec::with_capacity(3);
        for quota_type in [QuotaType::Members, QuotaType::ApiKeys, QuotaType::MonthlySessions] {
            let current = self.current_usage(tenant_id, quota_type).await?;
            out.push(QuotaCheckResult::evaluate(quota_type, current, limits.get(quota_type)));
        }
        Ok(out)
    }

    async fn current_usage(&self, tenant_id: Uuid, quota_type: QuotaType) -> Result<u32, sqlx::Error> {
        let count = match quota_type {
            QuotaType::Members => TenantUser::count_members(&self.db, tenant_id).await?,
            QuotaType::ApiKeys => TenantApiKey::count_active(&self.db, tenant_id).await?,
            QuotaType::MonthlySessions => {
                InterviewSession::count_for_tenant_since(&self.db, tenant_id, month_start(Utc::now())).await?
            }
        };
        Ok(count.clamp(0, u32::MAX as i64) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_grow_with_plan() {
        let plans = [TenantPlan::Trial, TenantPlan::Starter, TenantPlan::Pro, TenantPlan::Enterprise];
        for pair in plans.windows(2) {
            let (lower, higher) = (QuotaLimits::for_plan(pair[0]), QuotaLimits::for_plan(pair[1]));
            assert!(higher.members > lower.members);
            assert!(higher.api_keys > lower.api_keys);
            assert!(higher.monthly_sessions > lower.monthly_sessions);
        }
    }

    #[test]
    fn test_trial_allows_single_api_key() {
        let limits = QuotaLimits::for_plan(TenantPlan::Trial);
        assert!(QuotaCheckResult::evaluate(QuotaType::ApiKeys, 0, limits.api_keys).allowed);
        assert!(!QuotaCheckResult::evaluate(QuotaType::ApiKeys, 1, limits.api_keys).allowed);
    }

    #[test]
    fn test_over_limit_has_no_remaining() {
        let result = QuotaCheckResult::evaluate(QuotaType::Members, 12, 10);
        assert!(!result.allowed);
        assert_eq!(result.remaining, 0);
    }

    #[test]
    fn test_month_start() {
        let now = Utc.with_ymd_and_hms(2025, 3, 17, 15, 4, 5).unwrap();
        assert_eq!(month_start(now), Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_error_message() {
        let err = QuotaError::LimitExceeded {
            quota_type: QuotaType::ApiKeys,
            limit: 3,
            current: 3,
        };
        assert_eq!(err.to_string(), "API keys limit exceeded (3/3)");
    }
}
