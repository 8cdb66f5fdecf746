use crate::{
    app::AppState,
    error::ApiResult,
    extract::{Page, Pagination},
    ws::hub::HubStats,
};
use axum::{
    extract::{Query, State},
    Json,
};
use mockmate_shared::{
    db::pool::{get_pool_stats, PoolStats},
    dynamic_config::CacheStats,
    models::{
        activity_log::{ActivityFilter, ActivityLog},
        interview_session::{InterviewSession, SessionStats},
        payment::{Payment, PaymentFilter, PaymentStatus, RevenueByCurrency},
        tenant::Tenant,
        user::{User, UserCounts},
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub users: UserCounts,
    pub tenants: i64,
    pub sessions: SessionStats,
    pub revenue: Vec<RevenueByCurrency>,
    pub pending_payments: i64,
    pub realtime: HubStats,
    pub config_cache: CacheStats,
    pub pool: PoolStats,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub user_id: Option<Uuid>,

    /// e.g. `auth.` or `payment.`
    pub action: Option<String>,
}

pub async fn dashboard(State(state): State<AppState>) -> ApiResult<Json<Dashboard>> {
    let pending = PaymentFilter {
        user_id: None,
        status: Some(PaymentStatus::Pending),
    };

    Ok(Json(Dashboard {
        users: User::counts(&state.db).await?,
        tenants: Tenant::count(&state.db).await?,
        sessions: InterviewSession::stats(&state.db).await?,
        revenue: Payment::revenue_by_currency(&state.db).await?,
        pending_payments: Payment::count(&state.db, &pending).await?,
        realtime: state.hub.stats(),
        config_cache: state.settings.cache_stats(),
        pool: get_pool_stats(&state.db),
    }))
}

pub async fn activity(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Json<Page<ActivityLog>>> {
    let filter = ActivityFilter {
        user_id: query.user_id,
        action_prefix: query.action.filter(|a| !a.is_empty()),
    };

    let items = ActivityLog::list(&state.db, &filter, pagination.limit(), pagination.offset()).await?;
    let total = ActivityLog::count(&state.db, &filter).await?;

    Ok(Json(pagination.wrap(items, total)))
}
