//! # rapport-server
//!
//! Axum HTTP + `WebSocket` gateway for live sessions.
//!
//! - `GET /ws/{session_id}`: authenticated, role-tagged session connections
//! - Per-session broadcast with sequence numbers and a bounded replay buffer
//! - Heartbeat ping/pong with latency sampling and quality tiers
//! - `GET /health` and `GET /metrics` (Prometheus)
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use auth::{Authenticator, StaticTokenAuthenticator};
pub use config::ServerConfig;
pub use hub::Hub;
pub use server::RapportServer;
pub use shutdown::ShutdownCoordinator;
