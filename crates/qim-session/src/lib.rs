//! # qim-session
//!
//! The session contract the gateway consumes from a service-discovery/RPC
//! backend, and two implementations of it:
//!
//! - [`http::HttpConnector`]: JSON over HTTP against a discovery endpoint
//! - [`memory::MemoryConnector`]: in-process services for tests and demos

#![deny(unsafe_code)]

pub mod errors;
pub mod http;
pub mod memory;
pub mod session;

pub use errors::SessionError;
pub use session::{MemberMetadata, Overloads, ServiceProxy, Session, SessionConnector};

#[cfg(any(test, feature = "mock"))]
pub use session::MockServiceProxy;
