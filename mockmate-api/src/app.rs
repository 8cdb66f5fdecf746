/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use mockmate_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, None, config)?;
/// let app = mockmate_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    middleware::{
        auth::{require_admin, require_user, user_or_api_key},
        rate_limit::{auth_rate_limit_layer, rate_limit_layer, RateLimiter},
        security::SecurityHeadersLayer,
    },
    ws::hub::RoomHub,
};
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::{delete, get, post, put},
    Router,
};
use mockmate_shared::auth::jwt::TokenTtl;
use mockmate_shared::dynamic_config::ConfigService;
use mockmate_shared::email::EmailService;
use mockmate_shared::interviewer::{create_interviewer, Interviewer};
use mockmate_shared::payments::{create_provider, PaymentProvider};
use mockmate_shared::quota::QuotaEnforcer;
use mockmate_shared::redis::RedisClient;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned into every handler through Axum's `State` extractor; every field
/// is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub redis: Option<RedisClient>,
    pub config: Arc<Config>,

    /// Runtime settings from `system_config`
    pub settings: ConfigService,

    pub email: EmailService,
    pub payments: Arc<dyn PaymentProvider>,
    pub interviewer: Arc<dyn Interviewer>,
    pub hub: Arc<RoomHub>,
    pub limiter: Arc<RateLimiter>,
    pub quotas: QuotaEnforcer,
}

impl AppState {
    /// Builds state from configuration
    ///
    /// # Errors
    ///
    /// Fails when the SMTP transport cannot be constructed.
    pub fn new(db: PgPool, redis: Option<RedisClient>, config: Config) -> anyhow::Result<Self> {
        let email = EmailService::new(&config.email, Some(db.clone()))?;
        let payments = create_provider(config.payments.provider.clone());
        let interviewer = create_interviewer(&config.interviewer);

        Ok(Self::with_services(db, redis, config, email, payments, interviewer))
    }

    /// Builds state around explicit service instances
    pub fn with_services(
        db: PgPool,
        redis: Option<RedisClient>,
        config: Config,
        email: EmailService,
        payments: Arc<dyn PaymentProvider>,
        interviewer: Arc<dyn Interviewer>,
    ) -> Self {
        Self {
            settings: ConfigService::new(db.clone(), redis.clone()),
            limiter: Arc::new(RateLimiter::new(config.rate_limit.clone(), redis.clone())),
            quotas: QuotaEnforcer::new(db.clone()),
            hub: Arc::new(RoomHub::new()),
            email,
            payments,
            interviewer,
            db,
            redis,
            config: Arc::new(config),
        }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }

    pub fn token_ttl(&self) -> TokenTtl {
        self.config.jwt.ttl()
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET /health
/// ├── GET /ws                      # WebSocket (token in query or header)
/// ├── /api/
/// │   ├── auth/                    # register, login, refresh, me, passwords, account
/// │   ├── otp/                     # send, verify
/// │   ├── email-verification/      # send, verify, status
/// │   ├── alerts/                  # list, read, delete, SSE stream
/// │   ├── config/                  # public settings
/// │   ├── sessions/                # interviews and chat
/// │   ├── resumes/
/// │   ├── payments/                # packages, orders, verify, history, webhooks
/// │   ├── credits
/// │   └── tenant/                  # JWT or X-Api-Key
/// └── /admin/                      # JWT + admin role
/// ```
///
/// # Middleware Stack
///
/// Outermost first: security headers, CORS, tracing, global rate limit,
/// then per-group authentication and the stricter auth rate limit.
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let public_auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh))
        .route("/forgot-password", post(routes::auth::forgot_password))
        .route("/reset-password", post(routes::auth::reset_password))
        .layer(axum::middleware::from_fn_with_state(state.clone(), auth_rate_limit_layer));

    let account_routes = Router::new()
        .route("/me", get(routes::auth::me).put(routes::auth::update_me))
        .route("/change-password", post(routes::auth::change_password))
        .route("/account", delete(routes::auth::delete_account))
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_user));

    let auth_routes = Router::new()
        .route("/providers", get(routes::auth::providers))
        .merge(public_auth_routes)
        .merge(account_routes);

    let otp_routes = Router::new()
        .route("/send", post(routes::otp::send))
        .route("/verify", post(routes::otp::verify))
        .layer(axum::middleware::from_fn_with_state(state.clone(), auth_rate_limit_layer));

    let email_verification_routes = Router::new()
        .route("/send", post(routes::email_verification::send))
        .route("/status", get(routes::email_verification::status))
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_user))
        .route("/verify", post(routes::email_verification::verify));

    let alert_routes = Router::new()
        .route("/", get(routes::alerts::list))
        .route("/unread-count", get(routes::alerts::unread_count))
        .route("/read-all", put(routes::alerts::mark_all_read).post(routes::alerts::mark_all_read))
        .route("/stream", get(routes::alerts::stream))
        .route("/:id/read", put(routes::alerts::mark_read).post(routes::alerts::mark_read))
        .route("/:id", delete(routes::alerts::delete))
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_user));

    let config_routes = Router::new()
        .route("/public", get(routes::config::public))
        .route("/:key", get(routes::config::get_public_key));

    let session_routes = Router::new()
        .route("/", post(routes::sessions::create).get(routes::sessions::list))
        .route("/:id", get(routes::sessions::get))
        .route(
            "/:id/messages",
            get(routes::sessions::messages).post(routes::sessions::post_message),
        )
        .route("/:id/start", post(routes::sessions::start))
        .route("/:id/complete", post(routes::sessions::complete))
        .route("/:id/cancel", post(routes::sessions::cancel))
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_user));

    let resume_routes = Router::new()
        .route("/", post(routes::resumes::upload).get(routes::resumes::list))
        .route("/:id", get(routes::resumes::get).delete(routes::resumes::delete))
        .route("/:id/primary", put(routes::resumes::set_primary))
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_user));

    let payment_routes = Router::new()
        .route("/orders", post(routes::payments::create_order))
        .route("/orders/:order_id", get(routes::payments::get_order))
        .route("/verify", post(routes::payments::verify))
        .route("/history", get(routes::payments::history))
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_user))
        .route("/packages", get(routes::payments::packages))
        .route("/webhook/:provider", post(routes::payments::webhook));

    let credit_routes = Router::new()
        .route("/", get(routes::credits::summary))
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_user));

    let tenant_routes = Router::new()
        .route("/", get(routes::tenants::list_mine).post(routes::tenants::create))
        .route("/:tenant_id", get(routes::tenants::get).put(routes::tenants::update))
        .route("/:tenant_id/usage", get(routes::tenants::usage))
        .route("/:tenant_id/sessions", get(routes::tenants::sessions))
        .route(
            "/:tenant_id/users",
            get(routes::tenants::list_members).post(routes::tenants::add_member),
        )
        .route(
            "/:tenant_id/users/:user_id",
            put(routes::tenants::update_member).delete(routes::tenants::remove_member),
        )
        .route(
            "/:tenant_id/api-keys",
            get(routes::tenants::list_api_keys).post(routes::tenants::create_api_key),
        )
        .route("/:tenant_id/api-keys/:key_id", delete(routes::tenants::revoke_api_key))
        .layer(axum::middleware::from_fn_with_state(state.clone(), user_or_api_key));

    let api_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/otp", otp_routes)
        .nest("/email-verification", email_verification_routes)
        .nest("/alerts", alert_routes)
        .nest("/config", config_routes)
        .nest("/sessions", session_routes)
        .nest("/resumes", resume_routes)
        .nest("/payments", payment_routes)
        .nest("/credits", credit_routes)
        .nest("/tenant", tenant_routes);

    let admin_routes = routes::admin::router()
        .layer(axum::middleware::from_fn(require_admin))
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_user));

    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                HeaderName::from_static("x-api-key"),
            ])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/ws", get(crate::ws::handler::upgrade))
        .nest("/api", api_routes)
        .nest("/admin", admin_routes)
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit_layer))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}
