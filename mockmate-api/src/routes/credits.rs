use crate::{
    app::AppState,
    error::ApiResult,
    extract::{Page, Pagination},
    middleware::auth::CurrentUser,
};
use axum::{
    extract::{Query, State},
    Json,
};
use mockmate_shared::models::credit_transaction::CreditTransaction;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CreditSummary {
    pub balance: i32,

    /// Session cost currently in force
    pub session_cost: i32,

    pub transactions: Page<CreditTransaction>,
}

/// Balance plus the caller's ledger, newest first
pub async fn summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Json<CreditSummary>> {
    let items = CreditTransaction::list_for_user(&state.db, user.id, pagination.limit(), pagination.offset()).await?;
    let total = CreditTransaction::count_for_user(&state.db, user.id).await?;

    Ok(Json(CreditSummary {
        balance: user.credits,
        session_cost: state.settings.session_cost().await,
        transactions: pagination.wrap(items, total),
    }))
}
