/// Public runtime settings
///
/// - `GET /api/config/public` - Every setting flagged public
/// - `GET /api/config/:key` - One public setting
///
/// Private keys answer 404 exactly like missing ones.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct ConfigValue {
    pub key: String,
    pub value: JsonValue,
}

pub async fn public(State(state): State<AppState>) -> ApiResult<Json<BTreeMap<String, JsonValue>>> {
    Ok(Json(state.settings.get_public().await))
}

pub async fn get_public_key(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult<Json<ConfigValue>> {
    if !state.settings.is_public(&key).await {
        return Err(ApiError::not_found(format!("Setting '{}' not found", key)));
    }

    let value = state.settings.get(&key).await;
    Ok(Json(ConfigValue { key, value }))
}
