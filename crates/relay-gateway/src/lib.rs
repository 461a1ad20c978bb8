//! HTTP gateway for the Relay failover stream.
//!
//! Exposes `POST /chat`, which streams the completion of whichever backend
//! the failover orchestrator settles on, and `GET /health`, which reports
//! uptime and per-backend counters. All responses carry CORS headers.

/// CORS middleware.
pub mod middleware;
/// Router construction and request handlers.
pub mod server;

pub use middleware::CorsConfig;
pub use server::{AppState, GatewayServer};
