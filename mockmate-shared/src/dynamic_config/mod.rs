/// Dynamic system configuration
///
/// [`ConfigService`] reads `system_config` through two cache tiers:
///
/// ```text
/// get(key) ──> moka (in-process, 5 min TTL)
///                │ miss
///                ▼
///              Redis  config:{key}  (5 min TTL, optional)
///                │ miss
///                ▼
///              Postgres system_config
///                │ no row / error
///                ▼
///              built-in defaults (Null if none)
/// ```
///
/// Writes go to Postgres first and then drop the key from both tiers. Other
/// API instances keep their in-process copy until its TTL runs out. A failing
/// Redis or database never fails a read; the next tier answers instead.
///
/// # Example
///
/// ```no_run
/// use mockmate_shared::dynamic_config::{defaults, ConfigService};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) {
/// let config = ConfigService::new(pool, None);
/// let cost: i32 = config.get_or(defaults::SESSION_COST_CREDITS, 1).await;
/// # }
/// ```

pub mod defaults;

use chrono::Duration as ChronoDuration;
use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::models::otp_code::OtpPolicy;
use crate::models::system_config::{SystemConfigEntry, UpsertConfig};
use crate::payments::CreditPackage;
use crate::redis::RedisClient;
use defaults::{builtin_defaults, default_for, numeric_range};

pub const CACHE_TTL: Duration = Duration::from_secs(300);
const REDIS_PREFIX: &str = "config:";

#[derive(Debug, thiserror::Error)]
pub enum ConfigServiceError {
    #[error("Invalid config key: {0}")]
    InvalidKey(String),

    #[error("{key} must be an integer between {min} and {max}")]
    OutOfRange { key: String, min: i64, max: i64 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    redis_hits: AtomicU64,
    database_loads: AtomicU64,
    default_fallbacks: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub memory_entries: u64,
    pub memory_hits: u64,
    pub redis_hits: u64,
    pub database_loads: u64,
    pub default_fallbacks: u64,
    pub errors: u64,
    pub redis_enabled: bool,
    pub ttl_seconds: u64,
}

/// Cached lookup result; `None` records that the key has no stored row
type Stored = Option<JsonValue>;

#[derive(Clone)]
pub struct ConfigService {
    pool: PgPool,
    redis: Option<RedisClient>,
    memory: Cache<String, Stored>,
    counters: Arc<Counters>,
}

impl ConfigService {
    pub fn new(pool: PgPool, redis: Option<RedisClient>) -> Self {
        Self::with_ttl(pool, redis, CACHE_TTL)
    }

    pub fn with_ttl(pool: PgPool, redis: Option<RedisClient>, ttl: Duration) -> Self {
        Self {
            pool,
            redis,
            memory: Cache::builder().max_capacity(10_000).time_to_live(ttl).build(),
            counters: Arc::new(Counters::default()),
        }
    }

    /// The stored value, else the built-in default, else `Null`
    pub async fn get(&self, key: &str) -> JsonValue {
        match self.lookup(key).await {
            Some(value) => value,
            None => {
                self.counters.default_fallbacks.fetch_add(1, Ordering::Relaxed);
                default_for(key).cloned().unwrap_or(JsonValue::Null)
            }
        }
    }

    /// Integer read clamped to the key's allowed range
    async fn get_bounded(&self, key: &str, default: i64) -> i64 {
        let value = self.get_or(key, default).await;
        match numeric_range(key) {
            Some((min, max)) => value.clamp(min, max),
            None => value,
        }
    }

    /// Typed read; a missing or mistyped value yields `default`
    pub async fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let value = self.get(key).await;
        if value.is_null() {
            return default;
        }
        match serde_json::from_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key, error = %e, "Config value has unexpected type, using default");
                default
            }
        }
    }

    /// Defaults merged with every stored row
    pub async fn get_all(&self) -> BTreeMap<String, JsonValue> {
        let mut all: BTreeMap<String, JsonValue> = builtin_defaults()
            .iter()
            .map(|(k, s)| (k.to_string(), s.value.clone()))
            .collect();

        match SystemConfigEntry::list(&self.pool, None).await {
            Ok(rows) => all.extend(rows.into_iter().map(|r| (r.key, r.value))),
            Err(e) => self.record_error("get_all", &e),
        }
        all
    }

    /// Public defaults merged with public stored rows
    ///
    /// A stored row marked private hides a public default of the same key.
    pub async fn get_public(&self) -> BTreeMap<String, JsonValue> {
        let mut public: BTreeMap<String, JsonValue> = builtin_defaults()
            .iter()
            .filter(|(_, s)| s.is_public)
            .map(|(k, s)| (k.to_string(), s.value.clone()))
            .collect();

        match SystemConfigEntry::list(&self.pool, None).await {
            Ok(rows) => {
                for row in rows {
                    if row.is_public {
                        public.insert(row.key, row.value);
                    } else {
                        public.remove(&row.key);
                    }
                }
            }
            Err(e) => self.record_error("get_public", &e),
        }
        public
    }

    /// Whether `key` may be read without authentication
    pub async fn is_public(&self, key: &str) -> bool {
        match SystemConfigEntry::get(&self.pool, key).await {
            Ok(Some(row)) => row.is_public,
            Ok(None) => builtin_defaults().get(key).is_some_and(|s| s.is_public),
            Err(e) => {
                self.record_error("is_public", &e);
                builtin_defaults().get(key).is_some_and(|s| s.is_public)
            }
        }
    }

    /// Writes a value and drops the cached copies
    pub async fn set(&self, data: UpsertConfig) -> Result<SystemConfigEntry, ConfigServiceError> {
        validate_key(&data.key)?;
        validate_value(&data.key, &data.value)?;

        let entry = SystemConfigEntry::upsert(&self.pool, data).await?;
        self.invalidate(&entry.key).await;

        tracing::info!(key = %entry.key, updated_by = ?entry.updated_by, "Config value updated");
        Ok(entry)
    }

    pub async fn delete(&self, key: &str) -> Result<bool, ConfigServiceError> {
        let deleted = SystemConfigEntry::delete(&self.pool, key).await?;
        self.invalidate(key).await;
        Ok(deleted)
    }

    pub async fn invalidate(&self, key: &str) {
        self.memory.invalidate(key).await;

        if let Some(redis) = &self.redis {
            if let Err(e) = redis.del(&[redis_key(key)]).await {
                tracing::warn!(key, error = %e, "Failed to drop config key from Redis");
            }
        }
    }

    pub async fn invalidate_all(&self) {
        self.memory.invalidate_all();

        if let Some(redis) = &self.redis {
            match redis.del_matching(&format!("{}*", REDIS_PREFIX)).await {
                Ok(n) => tracing::info!(keys = n, "Cleared config keys from Redis"),
                Err(e) => tracing::warn!(error = %e, "Failed to clear config keys from Redis"),
            }
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            memory_entries: self.memory.entry_count(),
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            redis_hits: self.counters.redis_hits.load(Ordering::Relaxed),
            database_loads: self.counters.database_loads.load(Ordering::Relaxed),
            default_fallbacks: self.counters.default_fallbacks.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            redis_enabled: self.redis.is_some(),
            ttl_seconds: self.memory.policy().time_to_live().map_or(0, |d| d.as_secs()),
        }
    }

    /// Memory, then Redis, then Postgres; `None` if no tier has a stored value
    async fn lookup(&self, key: &str) -> Stored {
        if let Some(stored) = self.memory.get(key).await {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            return stored;
        }

        if let Some(value) = self.redis_get(key).await {
            self.counters.redis_hits.fetch_add(1, Ordering::Relaxed);
            self.memory.insert(key.to_string(), Some(value.clone())).await;
            return Some(value);
        }

        match SystemConfigEntry::get(&self.pool, key).await {
            Ok(row) => {
                self.counters.database_loads.fetch_add(1, Ordering::Relaxed);
                let stored = row.map(|r| r.value);
                if let Some(value) = &stored {
                    self.redis_set(key, value).await;
                }
                self.memory.insert(key.to_string(), stored.clone()).await;
                stored
            }
            Err(e) => {
                // Not cached, so the next read retries the database
                self.record_error(key, &e);
                None
            }
        }
    }

    async fn redis_get(&self, key: &str) -> Option<JsonValue> {
        let redis = self.redis.as_ref()?;
        match redis.get(&redis_key(key)).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Redis config read failed");
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn redis_set(&self, key: &str, value: &JsonValue) {
        let Some(redis) = &self.redis else { return };
        let ttl = self.memory.policy().time_to_live().unwrap_or(CACHE_TTL).as_secs();
        if let Err(e) = redis.set_ex(&redis_key(key), &value.to_string(), ttl).await {
            tracing::warn!(key, error = %e, "Redis config write failed");
        }
    }

    fn record_error(&self, context: &str, err: &sqlx::Error) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(context, error = %err, "Config database read failed, using defaults");
    }
}

/// Typed accessors for the settings the application reads
impl ConfigService {
    pub async fn session_cost(&self) -> i32 {
        self.get_bounded(defaults::SESSION_COST_CREDITS, 1).await as i32
    }

    pub async fn max_questions(&self) -> usize {
        self.get_bounded(defaults::INTERVIEW_MAX_QUESTIONS, 8).await as usize
    }

    pub async fn signup_bonus(&self) -> i32 {
        self.get_bounded(defaults::SIGNUP_BONUS_CREDITS, 3).await as i32
    }

    pub async fn require_email_verification(&self) -> bool {
        self.get_or(defaults::REQUIRE_EMAIL_VERIFICATION, false).await
    }

    pub async fn otp_policy(&self) -> OtpPolicy {
        let fallback = OtpPolicy::default();
        OtpPolicy {
            length: self.get_bounded(defaults::OTP_LENGTH, fallback.length as i64).await as usize,
            ttl: ChronoDuration::seconds(self.get_bounded(defaults::OTP_TTL_SECONDS, 300).await),
            max_attempts: self.get_bounded(defaults::OTP_MAX_ATTEMPTS, fallback.max_attempts as i64).await as i32,
            cooldown: ChronoDuration::seconds(self.get_bounded(defaults::OTP_COOLDOWN_SECONDS, 60).await),
        }
    }

    pub async fn email_verification_ttl(&self) -> ChronoDuration {
        ChronoDuration::hours(self.get_bounded(defaults::EMAIL_VERIFICATION_TTL_HOURS, 24).await)
    }

    pub async fn password_reset_ttl(&self) -> ChronoDuration {
        ChronoDuration::minutes(self.get_bounded(defaults::PASSWORD_RESET_TTL_MINUTES, 60).await)
    }

    pub async fn credit_packages(&self) -> Vec<CreditPackage> {
        self.get_or(defaults::CREDIT_PACKAGES, Vec::new()).await
    }

    pub async fn maintenance_mode(&self) -> bool {
        self.get_or(defaults::MAINTENANCE_MODE, false).await
    }

    pub async fn support_email(&self) -> String {
        self.get_or(defaults::SUPPORT_EMAIL, "support@mockmate.app".to_string()).await
    }

    pub async fn app_name(&self) -> String {
        self.get_or(defaults::APP_NAME, "MockMate".to_string()).await
    }
}

fn redis_key(key: &str) -> String {
    format!("{}{}", REDIS_PREFIX, key)
}

/// Dotted lowercase keys such as `otp.ttl_seconds`
pub fn validate_key(key: &str) -> Result<(), ConfigServiceError> {
    let valid = !key.is_empty()
        && key.len() <= 128
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '_' || c == '-')
        && !key.starts_with('.')
        && !key.ends_with('.');

    if valid {
        Ok(())
    } else {
        Err(ConfigServiceError::InvalidKey(key.to_string()))
    }
}

/// Integer settings must be whole numbers inside their range
pub fn validate_value(key: &str, value: &JsonValue) -> Result<(), ConfigServiceError> {
    let Some((min, max)) = numeric_range(key) else {
        return Ok(());
    };

    match value.as_i64() {
        Some(n) if (min..=max).contains(&n) => Ok(()),
        _ => Err(ConfigServiceError::OutOfRange {
            key: key.to_string(),
            min,
            max,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::postgres::PgPoolOptions;

    /// A pool whose every query fails quickly
    fn unreachable_pool() -> PgPool {
        PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgresql://mockmate@127.0.0.1:1/unreachable")
            .unwrap()
    }

    #[tokio::test]
    async fn test_database_failure_falls_back_to_defaults() {
        let service = ConfigService::new(unreachable_pool(), None);

        assert_eq!(service.get(defaults::OTP_LENGTH).await, json!(6));
        assert_eq!(service.get("unknown.key").await, JsonValue::Null);
        assert_eq!(service.session_cost().await, 1);

        let stats = service.cache_stats();
        assert!(stats.errors >= 2);
        assert_eq!(stats.memory_entries, 0);
    }

    #[tokio::test]
    async fn test_memory_tier_answers_before_database() {
        let service = ConfigService::new(unreachable_pool(), None);
        service
            .memory
            .insert(defaults::SESSION_COST_CREDITS.to_string(), Some(json!(4)))
            .await;

        assert_eq!(service.session_cost().await, 4);
        assert_eq!(service.cache_stats().memory_hits, 1);
        assert_eq!(service.cache_stats().errors, 0);
    }

    #[tokio::test]
    async fn test_cached_absence_uses_default() {
        let service = ConfigService::new(unreachable_pool(), None);
        service.memory.insert(defaults::OTP_TTL_SECONDS.to_string(), None).await;

        assert_eq!(service.get(defaults::OTP_TTL_SECONDS).await, json!(300));
        assert_eq!(service.cache_stats().errors, 0);
    }

    #[tokio::test]
    async fn test_invalidate_drops_memory_entry() {
        let service = ConfigService::new(unreachable_pool(), None);
        service.memory.insert("features.maintenance_mode".to_string(), Some(json!(true))).await;
        assert!(service.maintenance_mode().await);

        service.invalidate("features.maintenance_mode").await;
        assert!(!service.maintenance_mode().await);
    }

    #[tokio::test]
    async fn test_get_or_mistyped_value() {
        let service = ConfigService::new(unreachable_pool(), None);
        service.memory.insert("otp.length".to_string(), Some(json!("six"))).await;
        assert_eq!(service.get_or("otp.length", 6usize).await, 6);
    }

    #[tokio::test]
    async fn test_otp_policy_clamps() {
        let service = ConfigService::new(unreachable_pool(), None);
        service.memory.insert("otp.length".to_string(), Some(json!(40))).await;
        service.memory.insert("otp.max_attempts".to_string(), Some(json!(0))).await;

        let policy = service.otp_policy().await;
        assert_eq!(policy.length, 10);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.ttl, ChronoDuration::seconds(300));
    }

    #[tokio::test]
    async fn test_extreme_stored_durations_are_clamped() {
        let service = ConfigService::new(unreachable_pool(), None);
        service.memory.insert(defaults::OTP_TTL_SECONDS.to_string(), Some(json!(i64::MAX))).await;
        service.memory.insert(defaults::OTP_COOLDOWN_SECONDS.to_string(), Some(json!(i64::MIN))).await;
        service
            .memory
            .insert(defaults::EMAIL_VERIFICATION_TTL_HOURS.to_string(), Some(json!(i64::MAX)))
            .await;
        service
            .memory
            .insert(defaults::PASSWORD_RESET_TTL_MINUTES.to_string(), Some(json!(i64::MAX)))
            .await;

        let policy = service.otp_policy().await;
        assert_eq!(policy.ttl, ChronoDuration::seconds(86_400));
        assert_eq!(policy.cooldown, ChronoDuration::zero());
        assert_eq!(service.email_verification_ttl().await, ChronoDuration::hours(720));
        assert_eq!(service.password_reset_ttl().await, ChronoDuration::minutes(1_440));
    }

    #[test]
    fn test_validate_value_ranges() {
        assert!(validate_value(defaults::OTP_TTL_SECONDS, &json!(600)).is_ok());
        assert!(matches!(
            validate_value(defaults::OTP_TTL_SECONDS, &json!(i64::MAX)),
            Err(ConfigServiceError::OutOfRange { min: 30, max: 86_400, .. })
        ));
        assert!(validate_value(defaults::OTP_TTL_SECONDS, &json!("600")).is_err());
        assert!(validate_value(defaults::OTP_TTL_SECONDS, &json!(12.5)).is_err());
        assert!(validate_value(defaults::SESSION_COST_CREDITS, &json!(-1)).is_err());
        // Keys without a range accept anything
        assert!(validate_value(defaults::APP_NAME, &json!("Interview Lab")).is_ok());
        assert!(validate_value("custom.flag", &json!(i64::MAX)).is_ok());
    }

    #[tokio::test]
    async fn test_set_rejects_out_of_range_before_writing() {
        let service = ConfigService::new(unreachable_pool(), None);
        let result = service
            .set(UpsertConfig {
                key: defaults::OTP_TTL_SECONDS.to_string(),
                value: json!(i64::MAX),
                category: None,
                description: None,
                is_public: None,
                updated_by: None,
            })
            .await;

        assert!(matches!(result, Err(ConfigServiceError::OutOfRange { .. })));
        assert_eq!(service.cache_stats().errors, 0);
    }

    #[tokio::test]
    async fn test_public_defaults_without_database() {
        let service = ConfigService::new(unreachable_pool(), None);
        let public = service.get_public().await;
        assert!(public.contains_key(defaults::CREDIT_PACKAGES));
        assert!(!public.contains_key(defaults::OTP_LENGTH));
        assert_eq!(service.credit_packages().await.len(), 3);
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("otp.ttl_seconds").is_ok());
        assert!(validate_key("feature-x.enabled").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("Upper.Case").is_err());
        assert!(validate_key(".leading").is_err());
        assert!(validate_key("spaces are bad").is_err());
    }
}
