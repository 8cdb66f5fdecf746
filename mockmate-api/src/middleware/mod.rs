/// Middleware for the API server
///
/// - `auth`: JWT / API key authentication and the admin gate
/// - `rate_limit`: fixed-window request limits
/// - `security`: security response headers

pub mod auth;
pub mod rate_limit;
pub mod security;
