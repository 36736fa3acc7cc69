//! # qim-core
//!
//! Shared building blocks for the socket-to-session gateway:
//!
//! - Socket channel frames (`call` in, `reply` out) and their payloads
//! - Service descriptions produced by introspection
//! - `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod logging;
pub mod types;

pub use types::{
    CallRequest, CorrelationId, ErrorBody, Frame, FunctionDescription, Reply, ServiceDescription,
    Signature,
};
