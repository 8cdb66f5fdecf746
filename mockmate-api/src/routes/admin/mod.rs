/// Platform administration endpoints under `/admin`
///
/// Everything here sits behind `require_user` + `require_admin` (see
/// `app::build_router`). Handlers take the acting admin as [`CurrentUser`]
/// so changes can be attributed in the activity log.
///
/// [`CurrentUser`]: crate::middleware::auth::CurrentUser

pub mod alerts;
pub mod auth_providers;
pub mod config;
pub mod dashboard;
pub mod email_templates;
pub mod firebase_rules;
pub mod records;
pub mod tenants;
pub mod users;

use crate::app::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard::dashboard))
        .route("/activity", get(dashboard::activity))
        .route("/users", get(users::list))
        .route("/users/:id", get(users::get).put(users::update).delete(users::delete))
        .route("/users/:id/credits", post(users::adjust_credits))
        .route("/users/:id/purge", post(users::purge))
        .route("/sessions", get(records::sessions))
        .route("/payments", get(records::payments))
        .route("/config", get(config::list))
        .route("/config/cache/clear", post(config::clear_cache))
        .route("/config/cache/stats", get(config::cache_stats))
        .route(
            "/config/:key",
            get(config::get).put(config::put).delete(config::delete),
        )
        .route("/alerts", get(alerts::list).post(alerts::create))
        .route("/alerts/:id", delete(alerts::delete))
        .route("/tenants", get(tenants::list).post(tenants::create))
        .route(
            "/tenants/:id",
            get(tenants::get).put(tenants::update).delete(tenants::delete),
        )
        .route("/tenants/:id/users", get(tenants::users))
        .route("/tenants/:id/api-keys", get(tenants::api_keys))
        .route("/auth-providers", get(auth_providers::list))
        .route(
            "/auth-providers/:provider",
            put(auth_providers::upsert),
        )
        .route("/auth-providers/id/:id", delete(auth_providers::delete))
        .route(
            "/firebase-rules",
            get(firebase_rules::list).post(firebase_rules::create),
        )
        .route(
            "/firebase-rules/:id",
            get(firebase_rules::get)
                .put(firebase_rules::update)
                .delete(firebase_rules::delete),
        )
        .route("/firebase-rules/:id/render", post(firebase_rules::render))
        .route("/email-templates", get(email_templates::list))
        .route(
            "/email-templates/:key",
            put(email_templates::upsert).delete(email_templates::delete),
        )
        .route("/email-templates/:key/preview", post(email_templates::preview))
}
