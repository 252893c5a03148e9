//! `WebSocket` gateway: connection state, heartbeat, fan-out, dispatch.

pub mod broadcast;
pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod session;
