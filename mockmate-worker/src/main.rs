//! # MockMate Worker
//!
//! Runs the maintenance sweeper against the application database.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/mockmate cargo run -p mockmate-worker
//! ```
//!
//! The API server applies migrations; start it at least once first.

use mockmate_shared::db::pool::{close_pool, create_pool, DatabaseConfig};
use mockmate_worker::{config::WorkerConfig, sweeper::Sweeper, tasks::default_tasks};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mockmate_worker=debug,mockmate_shared=info".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("MockMate Worker v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = WorkerConfig::from_env()?;

    let pool = create_pool(DatabaseConfig {
        url: config.database_url.clone(),
        max_connections: config.max_connections,
        ..Default::default()
    })
    .await?;

    let sweeper = Sweeper::new(pool.clone(), default_tasks(&config), config.sweep_interval());

    let shutdown = sweeper.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received, finishing current sweep...");
        shutdown.cancel();
    });

    sweeper.run().await;

    close_pool(pool).await;
    tracing::info!("Worker stopped");

    Ok(())
}
