/// Fixed-window rate limiting
///
/// Each client gets a counter per window, keyed
/// `ratelimit:{scope}:{client}:{window}` where `window` is
/// `unix_seconds / window_secs`. With Redis the counter is an `INCR` +
/// `EXPIRE` pair, shared by every API instance; without Redis (or when a
/// Redis call fails) an in-process map keeps the count.
///
/// Two scopes are applied:
///
/// - `global`: every API route, `RATE_LIMIT_MAX_REQUESTS` per window
/// - `auth`: login, registration, password and OTP routes,
///   `AUTH_RATE_LIMIT_MAX_REQUESTS` per window
///
/// # Headers
///
/// - `X-RateLimit-Limit`: requests allowed per window
/// - `X-RateLimit-Remaining`: requests left in the current window
/// - `X-RateLimit-Reset`: seconds until the window rolls over
/// - `Retry-After`: on 429 responses
///
/// # Client identity
///
/// The client is the socket peer. `X-Forwarded-For` is read only when the
/// peer is one of `TRUSTED_PROXIES`, walking the hops from the right and
/// taking the first address that is not itself a trusted proxy.

use crate::app::AppState;
use crate::config::RateLimitConfig;
use crate::error::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use mockmate_shared::redis::RedisClient;
use std::net::{IpAddr, SocketAddr};
use std::time::{SystemTime, UNIX_EPOCH};

/// Local counters are pruned once the map grows past this
const LOCAL_PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Global,
    Auth,
}

impl LimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitScope::Global => "global",
            LimitScope::Auth => "auth",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,

    /// Seconds until the current window ends
    pub reset_after: u64,
}

impl Decision {
    pub fn evaluate(count: u64, limit: u64, reset_after: u64) -> Self {
        Self {
            allowed: count <= limit,
            limit,
            remaining: limit.saturating_sub(count),
            reset_after,
        }
    }
}

pub fn window_index(now_secs: u64, window_secs: u64) -> u64 {
    now_secs / window_secs.max(1)
}

pub fn window_reset_after(now_secs: u64, window_secs: u64) -> u64 {
    let window = window_secs.max(1);
    window - now_secs % window
}

pub fn window_key(scope: LimitScope, client: &str, window: u64) -> String {
    format!("ratelimit:{}:{}:{}", scope.as_str(), client, window)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub struct RateLimiter {
    config: RateLimitConfig,
    redis: Option<RedisClient>,
    local: DashMap<String, u64>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, redis: Option<RedisClient>) -> Self {
        Self {
            config,
            redis,
            local: DashMap::new(),
        }
    }

    pub fn limit_for(&self, scope: LimitScope) -> u64 {
        match scope {
            LimitScope::Global => self.config.max_requests,
            LimitScope::Auth => self.config.auth_max_requests,
        }
    }

    /// Counts one request and decides whether it may proceed
    pub async fn check(&self, scope: LimitScope, client: &str) -> Decision {
        self.check_at(scope, client, unix_now()).await
    }

    pub async fn check_at(&self, scope: LimitScope, client: &str, now_secs: u64) -> Decision {
        let window_secs = self.config.window_secs.max(1);
        let window = window_index(now_secs, window_secs);
        let key = window_key(scope, client, window);
        let limit = self.limit_for(scope);
        let reset_after = window_reset_after(now_secs, window_secs);

        if let Some(redis) = &self.redis {
            match redis.incr_window(&key, window_secs).await {
                Ok((count, ttl)) => {
                    let reset_after = if ttl > 0 { ttl as u64 } else { reset_after };
                    return Decision::evaluate(count, limit, reset_after);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Redis rate limit check failed, counting locally");
                }
            }
        }

        let count = self.incr_local(key, window);
        Decision::evaluate(count, limit, reset_after)
    }

    pub fn client_id(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        client_id(headers, peer, &self.config.trusted_proxies)
    }

    fn incr_local(&self, key: String, window: u64) -> u64 {
        if self.local.len() > LOCAL_PRUNE_THRESHOLD {
            let suffix = format!(":{}", window);
            self.local.retain(|k, _| k.ends_with(&suffix));
        }

        let mut entry = self.local.entry(key).or_insert(0);
        *entry += 1;
        *entry
    }
}

/// Client address used as the limiter key and in the activity log
pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>, trusted: &[IpAddr]) -> String {
    let Some(peer) = peer.map(|addr| addr.ip()) else {
        return "unknown".to_string();
    };

    if !trusted.contains(&peer) {
        return peer.to_string();
    }

    let hops: Vec<IpAddr> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|hop| hop.trim().parse::<IpAddr>().ok())
        .collect();

    hops.iter()
        .rev()
        .find(|hop| !trusted.contains(hop))
        .unwrap_or(&peer)
        .to_string()
}

async fn enforce(state: &AppState, scope: LimitScope, request: Request, next: Next) -> Result<Response, ApiError> {
    let peer = request.extensions().get::<ConnectInfo<SocketAddr>>().map(|c| c.0);
    let client = state.limiter.client_id(request.headers(), peer);

    let decision = state.limiter.check(scope, &client).await;

    if !decision.allowed {
        tracing::info!(client = %client, scope = scope.as_str(), limit = decision.limit, "Rate limit exceeded");
        return Err(ApiError::RateLimitExceeded {
            retry_after: decision.reset_after,
            limit: decision.limit,
            message: format!("Too many requests. Try again in {} seconds", decision.reset_after),
        });
    }

    let mut response = next.run(request).await;

    // The stricter auth limiter runs inside the global one; its numbers win
    let headers = response.headers_mut();
    if scope == LimitScope::Auth || !headers.contains_key("X-RateLimit-Limit") {
        headers.insert("X-RateLimit-Limit", HeaderValue::from(decision.limit));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));
        headers.insert("X-RateLimit-Reset", HeaderValue::from(decision.reset_after));
    }

    Ok(response)
}

pub async fn rate_limit_layer(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, ApiError> {
    enforce(&state, LimitScope::Global, request, next).await
}

pub async fn auth_rate_limit_layer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    enforce(&state, LimitScope::Auth, request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u64, auth_max: u64) -> RateLimiter {
        RateLimiter::new(
            RateLimitConfig {
                window_secs: 60,
                max_requests: max,
                auth_max_requests: auth_max,
                trusted_proxies: Vec::new(),
            },
            None,
        )
    }

    #[test]
    fn test_window_arithmetic() {
        assert_eq!(window_index(119, 60), 1);
        assert_eq!(window_index(120, 60), 2);
        assert_eq!(window_reset_after(120, 60), 60);
        assert_eq!(window_reset_after(179, 60), 1);
        // Zero-length windows are treated as one second
        assert_eq!(window_index(5, 0), 5);
    }

    #[test]
    fn test_window_key_format() {
        assert_eq!(window_key(LimitScope::Auth, "10.0.0.1", 42), "ratelimit:auth:10.0.0.1:42");
    }

    #[test]
    fn test_decision() {
        let d = Decision::evaluate(3, 3, 10);
        assert!(d.allowed);
        assert_eq!(d.remaining, 0);
        assert!(!Decision::evaluate(4, 3, 10).allowed);
    }

    #[tokio::test]
    async fn test_local_limit_and_window_rollover() {
        let limiter = limiter(100, 2);
        let t = 6_000;

        assert!(limiter.check_at(LimitScope::Auth, "1.2.3.4", t).await.allowed);
        assert!(limiter.check_at(LimitScope::Auth, "1.2.3.4", t + 1).await.allowed);
        let blocked = limiter.check_at(LimitScope::Auth, "1.2.3.4", t + 2).await;
        assert!(!blocked.allowed);
        assert_eq!(blocked.reset_after, 58);

        // Other clients and scopes have their own counters
        assert!(limiter.check_at(LimitScope::Auth, "5.6.7.8", t + 2).await.allowed);
        assert!(limiter.check_at(LimitScope::Global, "1.2.3.4", t + 2).await.allowed);

        // Next window starts fresh
        assert!(limiter.check_at(LimitScope::Auth, "1.2.3.4", t + 60).await.allowed);
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_client_id_ignores_headers_from_untrusted_peer() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "192.168.1.9:5000".parse().unwrap();
        assert_eq!(client_id(&headers, Some(peer), &[]), "192.168.1.9");
        assert_eq!(client_id(&headers, None, &[]), "unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("10.1.1.1"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.2"));
        assert_eq!(client_id(&headers, Some(peer), &[]), "192.168.1.9");
    }

    #[test]
    fn test_client_id_behind_trusted_proxy() {
        let proxy: SocketAddr = "10.0.0.2:443".parse().unwrap();
        let trusted = [ip("10.0.0.2"), ip("10.0.0.3")];

        // Right-most untrusted hop wins; a spoofed left-most entry is ignored
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.1.1.1, 203.0.113.7, 10.0.0.3"));
        assert_eq!(client_id(&headers, Some(proxy), &trusted), "203.0.113.7");

        // Nothing usable falls back to the proxy itself
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("garbage, 10.0.0.3"));
        assert_eq!(client_id(&headers, Some(proxy), &trusted), "10.0.0.2");
    }

    #[tokio::test]
    async fn test_rotating_forwarded_for_shares_one_counter() {
        let limiter = limiter(1_000, 5);
        let peer: SocketAddr = "203.0.113.7:40000".parse().unwrap();
        let t = 6_000;

        let mut denied = 0;
        for i in 0..50 {
            let mut headers = HeaderMap::new();
            let spoofed = format!("198.51.100.{}", i);
            headers.insert("x-forwarded-for", HeaderValue::from_str(&spoofed).unwrap());

            let client = limiter.client_id(&headers, Some(peer));
            if !limiter.check_at(LimitScope::Auth, &client, t).await.allowed {
                denied += 1;
            }
        }

        assert_eq!(denied, 45);
    }
}
