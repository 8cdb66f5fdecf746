//! # MockMate Shared Library
//!
//! Types, services and business logic shared by the MockMate API server and
//! the maintenance worker.
//!
//! ## Module Organization
//!
//! - `models`: Database models and their queries
//! - `auth`: Password hashing, JWTs, API keys, single-use tokens, authorization
//! - `db`: Connection pool and migrations
//! - `redis`: Optional Redis client
//! - `dynamic_config`: Cached `system_config` settings with built-in defaults
//! - `email`: Template rendering and SMTP delivery
//! - `payments`: Payment gateway providers
//! - `interviewer`: AI and scripted interviewers
//! - `quota`: Tenant plan limits
//! - `templating`: `{{ variable }}` rendering

pub mod auth;
pub mod db;
pub mod dynamic_config;
pub mod email;
pub mod interviewer;
pub mod models;
pub mod payments;
pub mod quota;
pub mod redis;
pub mod templating;

/// Current version of the MockMate shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
