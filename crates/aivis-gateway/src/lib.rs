//! # Aivis Gateway
//!
//! HTTP surface for the daily batch pipeline. Every endpoint is a
//! stateless handler over the shared pipeline components; scheduled
//! callers authenticate with the synced cron secret, operators with the
//! admin bearer token.

pub mod routes;
pub mod server;

pub use server::{build_router, start, AppState};
