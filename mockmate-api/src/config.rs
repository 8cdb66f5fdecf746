/// Configuration management for the API server
///
/// Static settings come from environment variables (a `.env` file is loaded
/// first when present). Settings that admins change at runtime live in the
/// dynamic config service instead.
///
/// # Environment Variables
///
/// - `API_HOST` / `API_PORT`: bind address (default `0.0.0.0:8080`)
/// - `CORS_ORIGINS`: comma-separated allow-list, or `*` (default)
/// - `APP_ENV`: `production` enables HSTS
/// - `PUBLIC_BASE_URL`: used in emailed links and payment return URLs
/// - `DATABASE_URL` or `DB_HOST`/`DB_PORT`/`DB_USER`/`DB_PASSWORD`/`DB_NAME`
/// - `DATABASE_MAX_CONNECTIONS` (default 10)
/// - `JWT_SECRET`: required, at least 32 characters
/// - `JWT_ACCESS_TTL_MINUTES` (default 60) / `JWT_REFRESH_TTL_DAYS` (default 30)
/// - `REDIS_URL`: optional
/// - `SMTP_*`, `PAYMENT_PROVIDER`, `CASHFREE_*`, `STRIPE_*`, `AI_*`
/// - `RATE_LIMIT_WINDOW_SECS`, `RATE_LIMIT_MAX_REQUESTS`, `AUTH_RATE_LIMIT_MAX_REQUESTS`
/// - `TRUSTED_PROXIES`: comma-separated proxy IPs allowed to set `X-Forwarded-For`
///
/// # Example
///
/// ```no_run
/// use mockmate_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use chrono::Duration;
use mockmate_shared::auth::jwt::TokenTtl;
use mockmate_shared::db::pool::database_url_from_parts;
use mockmate_shared::email::EmailConfig;
use mockmate_shared::interviewer::InterviewerConfig;
use mockmate_shared::payments::cashfree::{CashfreeConfig, CashfreeEnvironment};
use mockmate_shared::payments::stripe::StripeConfig;
use mockmate_shared::payments::ProviderConfig;
use std::env;
use std::net::IpAddr;
use std::str::FromStr;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,

    /// `None` runs without Redis; caches and limiters stay in-process
    pub redis_url: Option<String>,

    pub email: EmailConfig,
    pub payments: PaymentConfig,
    pub rate_limit: RateLimitConfig,
    pub interviewer: InterviewerConfig,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `["*"]` allows any
    pub cors_origins: Vec<String>,

    /// Production mode (enables HSTS)
    pub production: bool,

    /// Base URL of the web app, without trailing slash
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HS256 signing secret, at least 32 bytes
    ///
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

impl JwtConfig {
    pub fn ttl(&self) -> TokenTtl {
        TokenTtl {
            access: Duration::minutes(self.access_ttl_minutes),
            refresh: Duration::days(self.refresh_ttl_days),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub provider: ProviderConfig,
}

impl PaymentConfig {
    /// Reads `PAYMENT_PROVIDER` (`cashfree`, `stripe` or `dummy`)
    ///
    /// Without an explicit provider, Cashfree is chosen when its keys are
    /// present and the dummy provider otherwise.
    fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let non_empty = |name: &str| lookup(name).filter(|s| !s.trim().is_empty());

        let cashfree_keys = (non_empty("CASHFREE_APP_ID"), non_empty("CASHFREE_SECRET_KEY"));

        let name = lookup("PAYMENT_PROVIDER").unwrap_or_else(|| match cashfree_keys {
            (Some(_), Some(_)) => "cashfree".to_string(),
            _ => "dummy".to_string(),
        });

        let provider = match name.to_ascii_lowercase().as_str() {
            "cashfree" => {
                let (Some(app_id), Some(secret_key)) = cashfree_keys else {
                    anyhow::bail!("CASHFREE_APP_ID and CASHFREE_SECRET_KEY are required for the cashfree provider");
                };
                ProviderConfig::Cashfree(CashfreeConfig {
                    app_id,
                    secret_key,
                    environment: CashfreeEnvironment::parse(
                        &lookup("CASHFREE_ENV").unwrap_or_else(|| "sandbox".to_string()),
                    ),
                    webhook_secret: non_empty("CASHFREE_WEBHOOK_SECRET"),
                })
            }
            "stripe" => {
                let (Some(secret_key), Some(webhook_secret)) =
                    (non_empty("STRIPE_SECRET_KEY"), non_empty("STRIPE_WEBHOOK_SECRET"))
                else {
                    anyhow::bail!("STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET are required for the stripe provider");
                };
                ProviderConfig::Stripe(StripeConfig {
                    secret_key,
                    webhook_secret,
                })
            }
            "dummy" => ProviderConfig::Dummy,
            other => anyhow::bail!("Unknown PAYMENT_PROVIDER: {}", other),
        };

        Ok(Self { provider })
    }

    pub fn provider_name(&self) -> &'static str {
        match self.provider {
            ProviderConfig::Cashfree(_) => "cashfree",
            ProviderConfig::Stripe(_) => "stripe",
            ProviderConfig::Dummy => "dummy",
        }
    }
}

/// Fixed-window limits applied per client IP
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_secs: u64,

    /// Requests per window across the whole API
    pub max_requests: u64,

    /// Requests per window on auth and OTP endpoints
    pub auth_max_requests: u64,

    /// Reverse proxies whose `X-Forwarded-For` is believed
    ///
    /// Empty means forwarding headers are ignored and the socket peer is
    /// the client.
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 300,
            auth_max_requests: 20,
            trusted_proxies: Vec::new(),
        }
    }
}

/// Parses a comma-separated list of IP addresses
pub fn parse_ip_list(raw: &str) -> anyhow::Result<Vec<IpAddr>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpAddr>()
                .map_err(|e| anyhow::anyhow!("Invalid address in TRUSTED_PROXIES ({}): {}", s, e))
        })
        .collect()
}

fn parse_or<T: FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", name, e)),
        _ => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Fails when a required variable is missing or a value does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let api_port = parse_or("API_PORT", 8080u16)?;

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let production = env::var("APP_ENV").map(|e| e.eq_ignore_ascii_case("production")).unwrap_or(false);

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        let database_url = env::var("DATABASE_URL")
            .ok()
            .or_else(|| database_url_from_parts(|k| env::var(k).ok()))
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL (or DB_HOST/DB_USER/DB_NAME) is required"))?;

        let max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10u32)?;

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let defaults = RateLimitConfig::default();

        Ok(Self {
            api: ApiConfig {
                host: api_host,
                port: api_port,
                cors_origins,
                production,
                public_base_url,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                access_ttl_minutes: parse_or("JWT_ACCESS_TTL_MINUTES", 60i64)?,
                refresh_ttl_days: parse_or("JWT_REFRESH_TTL_DAYS", 30i64)?,
            },
            redis_url: env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            email: EmailConfig::from_env(),
            payments: PaymentConfig::from_env()?,
            rate_limit: RateLimitConfig {
                window_secs: parse_or("RATE_LIMIT_WINDOW_SECS", defaults.window_secs)?,
                max_requests: parse_or("RATE_LIMIT_MAX_REQUESTS", defaults.max_requests)?,
                auth_max_requests: parse_or("AUTH_RATE_LIMIT_MAX_REQUESTS", defaults.auth_max_requests)?,
                trusted_proxies: parse_ip_list(&env::var("TRUSTED_PROXIES").unwrap_or_default())?,
            },
            interviewer: InterviewerConfig::from_env(),
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Absolute link into the web app
    pub fn app_url(&self, path: &str) -> String {
        format!("{}/{}", self.api.public_base_url, path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                cors_origins: vec!["*".to_string()],
                production: false,
                public_base_url: "https://app.mockmate.test".to_string(),
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/test".to_string(),
                max_connections: 10,
            },
            jwt: JwtConfig {
                secret: "test-secret-key-at-least-32-bytes-long".to_string(),
                access_ttl_minutes: 15,
                refresh_ttl_days: 7,
            },
            redis_url: None,
            email: EmailConfig::log_only(),
            payments: PaymentConfig {
                provider: ProviderConfig::Dummy,
            },
            rate_limit: RateLimitConfig::default(),
            interviewer: InterviewerConfig {
                api_url: "https://api.openai.com/v1".to_string(),
                api_key: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
            },
        }
    }

    #[test]
    fn test_bind_address() {
        assert_eq!(sample().bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_app_url_joins_paths() {
        let config = sample();
        assert_eq!(config.app_url("/verify-email?token=x"), "https://app.mockmate.test/verify-email?token=x");
        assert_eq!(config.app_url("payments"), "https://app.mockmate.test/payments");
    }

    #[test]
    fn test_jwt_ttl() {
        let ttl = sample().jwt.ttl();
        assert_eq!(ttl.access, Duration::minutes(15));
        assert_eq!(ttl.refresh, Duration::days(7));
    }

    #[test]
    fn test_provider_name() {
        assert_eq!(sample().payments.provider_name(), "dummy");
    }

    #[test]
    fn test_parse_ip_list() {
        let ips = parse_ip_list(" 10.0.0.1, ::1 ,").unwrap();
        assert_eq!(ips, vec!["10.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse().unwrap()]);
        assert!(parse_ip_list("").unwrap().is_empty());
        assert!(parse_ip_list("10.0.0.0/8").is_err());
    }

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| vars.iter().find(|(k, _)| *k == name).map(|(_, v)| v.to_string())
    }

    #[test]
    fn test_stripe_requires_webhook_secret() {
        let missing = PaymentConfig::from_lookup(lookup(&[
            ("PAYMENT_PROVIDER", "stripe"),
            ("STRIPE_SECRET_KEY", "sk_test_1"),
        ]));
        assert!(missing.is_err());

        let blank = PaymentConfig::from_lookup(lookup(&[
            ("PAYMENT_PROVIDER", "stripe"),
            ("STRIPE_SECRET_KEY", "sk_test_1"),
            ("STRIPE_WEBHOOK_SECRET", "  "),
        ]));
        assert!(blank.is_err());

        let config = PaymentConfig::from_lookup(lookup(&[
            ("PAYMENT_PROVIDER", "stripe"),
            ("STRIPE_SECRET_KEY", "sk_test_1"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_1"),
        ]))
        .unwrap();
        assert_eq!(config.provider_name(), "stripe");
    }

    #[test]
    fn test_provider_defaults_to_dummy_without_keys() {
        let config = PaymentConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.provider_name(), "dummy");

        let config = PaymentConfig::from_lookup(lookup(&[
            ("CASHFREE_APP_ID", "app"),
            ("CASHFREE_SECRET_KEY", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.provider_name(), "cashfree");
    }
}
