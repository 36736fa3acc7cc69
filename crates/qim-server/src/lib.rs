//! # qim-server
//!
//! Axum socket channel gateway.
//!
//! - Socket listener: one private session per connection, pipelined calls,
//!   heartbeat pings, `reply` frames correlated by `idm`
//! - HTTP listener: `socket.io.js` and `qimessaging.js` served from the
//!   assets directory, `/health`, `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::GatewayConfig;
pub use server::{GatewayServer, ListenHandle};
