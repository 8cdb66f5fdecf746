/// Worker configuration
///
/// # Environment Variables
///
/// - `DATABASE_URL` or `DB_HOST`/`DB_PORT`/`DB_USER`/`DB_PASSWORD`/`DB_NAME`
/// - `WORKER_SWEEP_INTERVAL_SECS`: delay between sweeps (default 300)
/// - `STALE_SESSION_MINUTES`: idle in-progress sessions are abandoned after this (default 120)
/// - `PENDING_PAYMENT_HOURS`: unpaid checkouts expire after this (default 24)
/// - `TOKEN_RETENTION_HOURS`: spent or expired codes and links are kept this long (default 24)

use chrono::Duration;
use mockmate_shared::db::pool::database_url_from_parts;
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerConfigError {
    #[error("DATABASE_URL (or DB_HOST/DB_USER/DB_NAME) is required")]
    MissingDatabaseUrl,

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub sweep_interval_secs: u64,
    pub stale_session_minutes: i64,
    pub pending_payment_hours: i64,
    pub token_retention_hours: i64,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, WorkerConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, WorkerConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .or_else(|| database_url_from_parts(&lookup))
            .ok_or(WorkerConfigError::MissingDatabaseUrl)?;

        Ok(Self {
            database_url,
            max_connections: positive(&lookup, "WORKER_DATABASE_MAX_CONNECTIONS", 2)?,
            sweep_interval_secs: positive(&lookup, "WORKER_SWEEP_INTERVAL_SECS", 300)?,
            stale_session_minutes: positive(&lookup, "STALE_SESSION_MINUTES", 120)?,
            pending_payment_hours: positive(&lookup, "PENDING_PAYMENT_HOURS", 24)?,
            token_retention_hours: positive(&lookup, "TOKEN_RETENTION_HOURS", 24)?,
        })
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn stale_session_after(&self) -> Duration {
        Duration::minutes(self.stale_session_minutes)
    }

    pub fn pending_payment_after(&self) -> Duration {
        Duration::hours(self.pending_payment_hours)
    }

    pub fn token_retention(&self) -> Duration {
        Duration::hours(self.token_retention_hours)
    }
}

/// Parses a strictly positive number, falling back to `default` when unset
fn positive<T>(lookup: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T, WorkerConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let Some(raw) = lookup(name).filter(|v| !v.trim().is_empty()) else {
        return Ok(default);
    };

    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(WorkerConfigError::InvalidValue { name, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/mockmate")])).unwrap();

        assert_eq!(config.sweep_interval_secs, 300);
        assert_eq!(config.stale_session_after(), Duration::minutes(120));
        assert_eq!(config.pending_payment_after(), Duration::hours(24));
        assert_eq!(config.token_retention(), Duration::hours(24));
    }

    #[test]
    fn test_database_url_from_parts() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("DB_HOST", "db"),
            ("DB_USER", "mockmate"),
            ("DB_NAME", "mockmate"),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "postgresql://mockmate@db:5432/mockmate");
    }

    #[test]
    fn test_missing_database_url() {
        assert!(matches!(
            WorkerConfig::from_lookup(lookup(&[])),
            Err(WorkerConfigError::MissingDatabaseUrl)
        ));
    }

    #[test]
    fn test_rejects_zero_and_garbage() {
        let zero = WorkerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/mockmate"),
            ("WORKER_SWEEP_INTERVAL_SECS", "0"),
        ]));
        assert!(matches!(zero, Err(WorkerConfigError::InvalidValue { name: "WORKER_SWEEP_INTERVAL_SECS", .. })));

        let garbage = WorkerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/mockmate"),
            ("PENDING_PAYMENT_HOURS", "soon"),
        ]));
        assert!(garbage.is_err());
    }
}
