//! # MockMate API Server
//!
//! Serves the REST API, the alert SSE stream and the `/ws` WebSocket for
//! live interview sessions.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/mockmate JWT_SECRET=... cargo run -p mockmate-api
//! ```
//!
//! Set `LOG_FORMAT=json` for structured logs and `RUST_LOG` to adjust levels.

use mockmate_api::{app, config::Config};
use mockmate_shared::db::{
    migrations::run_migrations,
    pool::{close_pool, create_pool, DatabaseConfig},
};
use mockmate_shared::redis::{RedisClient, RedisConfig};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mockmate_api=debug,mockmate_shared=info,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received, draining connections...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("MockMate API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let pool = create_pool(DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..Default::default()
    })
    .await?;
    run_migrations(&pool).await?;

    let redis = match config.redis_url.as_deref() {
        Some(url) => match RedisClient::new(RedisConfig::new(url)).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, falling back to in-process caches");
                None
            }
        },
        None => {
            tracing::info!("REDIS_URL not set, using in-process caches");
            None
        }
    };

    let bind_address = config.bind_address();
    let state = app::AppState::new(pool.clone(), redis, config)?;
    tracing::info!(
        payments = state.payments.name(),
        email = if state.email.is_smtp() { "smtp" } else { "log" },
        "Services ready"
    );

    let router = app::build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    close_pool(pool).await;
    tracing::info!("Server stopped");
    Ok(())
}
