//! # MockMate Worker Library
//!
//! Background maintenance for the MockMate database: expired one-time codes
//! and links are purged, expired alerts deleted, idle interviews abandoned
//! and unconfirmed checkouts expired.
//!
//! ## Modules
//!
//! - `config`: environment configuration
//! - `tasks`: the [`tasks::MaintenanceTask`] trait and the standard tasks
//! - `sweeper`: the periodic loop that runs them

pub mod config;
pub mod sweeper;
pub mod tasks;
