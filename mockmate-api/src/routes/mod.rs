/// API route handlers
///
/// Organized by resource:
///
/// - `health`: liveness with database and Redis status
/// - `auth`, `otp`, `email_verification`: accounts and sign-in
/// - `alerts`, `config`: notifications and public settings
/// - `sessions`, `resumes`: interview practice
/// - `payments`, `credits`: buying and spending credits
/// - `tenants`: organizations, members and API keys
/// - `admin`: operator console

pub mod admin;
pub mod alerts;
pub mod auth;
pub mod config;
pub mod credits;
pub mod email_verification;
pub mod health;
pub mod otp;
pub mod payments;
pub mod resumes;
pub mod sessions;
pub mod tenants;

use crate::{app::AppState, error::ApiError};
use axum::{extract::ConnectInfo, http::HeaderMap};
use std::net::SocketAddr;

/// New sessions and payments are refused while maintenance mode is on
pub(crate) async fn ensure_open(state: &AppState) -> Result<(), ApiError> {
    if state.settings.maintenance_mode().await {
        return Err(ApiError::ServiceUnavailable(
            "MockMate is under maintenance, please try again shortly".to_string(),
        ));
    }
    Ok(())
}

/// Client address recorded in the activity log
pub(crate) fn client_ip(
    state: &AppState,
    headers: &HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
) -> Option<String> {
    let id = state.limiter.client_id(headers, connect.map(|ConnectInfo(addr)| addr));
    (id != "unknown").then_some(id)
}
