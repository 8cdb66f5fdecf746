//! # MockMate API Server Library
//!
//! HTTP, SSE and WebSocket surface of the MockMate interview platform.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Environment configuration
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Validated JSON bodies and pagination
//! - `middleware`: Authentication, rate limiting, security headers
//! - `routes`: REST and SSE handlers
//! - `ws`: Room hub and the `/ws` endpoint

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod ws;
