/// Schema migrations
///
/// SQL files live in the workspace-level `migrations/` directory and are
/// embedded at compile time with `sqlx::migrate!`. The API runs them on
/// startup; the integration tests run them against the test database.

use sqlx::{migrate::MigrateDatabase, postgres::PgPool, Postgres};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, serde::Serialize)]
pub struct MigrationStatus {
    pub applied_migrations: usize,
    /// Latest applied version (timestamp prefix of the file name)
    pub latest_version: Option<i64>,
    pub pending_migrations: usize,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending_migrations == 0
    }
}

/// Applies every pending migration
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    info!("Running database migrations");

    match sqlx::migrate!("../migrations").run(pool).await {
        Ok(()) => {
            info!("Database migrations complete");
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Migration failed");
            Err(e)
        }
    }
}

/// Compares the applied versions with the embedded migration set
pub async fn get_migration_status(pool: &PgPool) -> Result<MigrationStatus, sqlx::Error> {
    let known = sqlx::migrate!("../migrations").iter().count();

    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = 'public' AND table_name = '_sqlx_migrations'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        debug!("Migrations table does not exist yet");
        return Ok(MigrationStatus {
            applied_migrations: 0,
            latest_version: None,
            pending_migrations: known,
        });
    }

    let (count, latest_version): (i64, Option<i64>) =
        sqlx::query_as("SELECT COUNT(*), MAX(version) FROM _sqlx_migrations WHERE success = TRUE")
            .fetch_one(pool)
            .await?;

    let applied = count.max(0) as usize;

    Ok(MigrationStatus {
        applied_migrations: applied,
        latest_version,
        pending_migrations: known.saturating_sub(applied),
    })
}

/// Creates the database if it doesn't exist (development and tests)
pub async fn ensure_database_exists(database_url: &str) -> Result<(), sqlx::Error> {
    if !Postgres::database_exists(database_url).await? {
        info!("Database does not exist, creating it");
        Postgres::create_database(database_url).await?;
    }

    Ok(())
}
