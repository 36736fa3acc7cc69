//! Socket channel: connection state, frame handling and lifecycle.

pub mod connection;
pub mod handler;
pub mod lifecycle;
pub mod registry;
