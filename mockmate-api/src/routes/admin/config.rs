/// Runtime settings administration
///
/// Listing shows every key the application knows about: stored rows, plus
/// built-in defaults that have no row yet (`source: "default"`). Writes go
/// through the config service so cached copies are dropped immediately.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::auth::CurrentUser,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use mockmate_shared::{
    dynamic_config::{defaults::builtin_defaults, CacheStats},
    models::{
        activity_log::{ActivityLog, NewActivity},
        system_config::{SystemConfigEntry, UpsertConfig},
    },
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;

#[derive(Debug, Default, Deserialize)]
pub struct ConfigQuery {
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigEntryView {
    pub key: String,
    pub value: JsonValue,
    pub category: String,
    pub description: Option<String>,
    pub is_public: bool,

    /// `database` or `default`
    pub source: &'static str,

    pub updated_at: Option<DateTime<Utc>>,
}

impl From<SystemConfigEntry> for ConfigEntryView {
    fn from(entry: SystemConfigEntry) -> Self {
        ConfigEntryView {
            key: entry.key,
            value: entry.value,
            category: entry.category,
            description: entry.description,
            is_public: entry.is_public,
            source: "database",
            updated_at: Some(entry.updated_at),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PutConfigRequest {
    pub value: JsonValue,
    pub category: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct CacheCleared {
    pub cleared: bool,
}

fn default_view(key: &str) -> Option<ConfigEntryView> {
    builtin_defaults().get(key).map(|d| ConfigEntryView {
        key: d.key.to_string(),
        value: d.value.clone(),
        category: d.category.to_string(),
        description: Some(d.description.to_string()),
        is_public: d.is_public,
        source: "default",
        updated_at: None,
    })
}

/// Stored rows win over defaults of the same key
fn merge_with_defaults(rows: Vec<SystemConfigEntry>, category: Option<&str>) -> Vec<ConfigEntryView> {
    let mut merged: BTreeMap<String, ConfigEntryView> = builtin_defaults()
        .keys()
        .filter_map(|key| default_view(key))
        .filter(|view| category.map_or(true, |c| view.category == c))
        .map(|view| (view.key.clone(), view))
        .collect();

    for row in rows {
        merged.insert(row.key.clone(), row.into());
    }

    merged.into_values().collect()
}

pub async fn list(State(state): State<AppState>, Query(query): Query<ConfigQuery>) -> ApiResult<Json<Vec<ConfigEntryView>>> {
    let category = query.category.as_deref().filter(|c| !c.is_empty());
    let rows = SystemConfigEntry::list(&state.db, category).await?;

    Ok(Json(merge_with_defaults(rows, category)))
}

pub async fn get(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult<Json<ConfigEntryView>> {
    if let Some(row) = SystemConfigEntry::get(&state.db, &key).await? {
        return Ok(Json(row.into()));
    }

    default_view(&key)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Setting '{}' not found", key)))
}

/// Creates or replaces a setting
///
/// Category, description and visibility fall back to the built-in default's
/// when the key has one.
pub async fn put(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Path(key): Path<String>,
    Json(req): Json<PutConfigRequest>,
) -> ApiResult<Json<ConfigEntryView>> {
    let fallback = builtin_defaults().get(key.as_str());

    let entry = state
        .settings
        .set(UpsertConfig {
            key: key.clone(),
            value: req.value,
            category: req.category.or_else(|| fallback.map(|d| d.category.to_string())),
            description: req.description.or_else(|| fallback.map(|d| d.description.to_string())),
            is_public: req.is_public.or_else(|| fallback.map(|d| d.is_public)),
            updated_by: Some(admin.id),
        })
        .await?;

    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(admin.id), "admin.config_updated")
            .entity("system_config", &key)
            .metadata(json!({ "value": entry.value })),
    )
    .await;

    Ok(Json(entry.into()))
}

/// Deletes the stored row; the key reverts to its default if it has one
pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Path(key): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.settings.delete(&key).await? {
        return Err(ApiError::not_found(format!("Setting '{}' not found", key)));
    }

    ActivityLog::record_quietly(
        &state.db,
        NewActivity::new(Some(admin.id), "admin.config_deleted").entity("system_config", &key),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_cache(State(state): State<AppState>, CurrentUser(admin): CurrentUser) -> ApiResult<Json<CacheCleared>> {
    state.settings.invalidate_all().await;
    tracing::info!(admin_id = %admin.id, "Config cache cleared");

    Ok(Json(CacheCleared { cleared: true }))
}

pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.settings.cache_stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockmate_shared::dynamic_config::defaults::{MAINTENANCE_MODE, SESSION_COST_CREDITS};

    fn row(key: &str, value: JsonValue) -> SystemConfigEntry {
        SystemConfigEntry {
            key: key.to_string(),
            value,
            category: "custom".to_string(),
            description: None,
            is_public: false,
            updated_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_stored_row_overrides_default() {
        let merged = merge_with_defaults(vec![row(SESSION_COST_CREDITS, json!(5))], None);
        let cost = merged.iter().find(|v| v.key == SESSION_COST_CREDITS).unwrap();

        assert_eq!(cost.value, json!(5));
        assert_eq!(cost.source, "database");
        assert!(merged.iter().any(|v| v.key == MAINTENANCE_MODE && v.source == "default"));
    }

    #[test]
    fn test_category_filter_applies_to_defaults() {
        let merged = merge_with_defaults(vec![], Some("otp"));
        assert!(!merged.is_empty());
        assert!(merged.iter().all(|v| v.category == "otp"));
    }

    #[test]
    fn test_unknown_key_has_no_default() {
        assert!(default_view("nope.nothing").is_none());
    }
}
