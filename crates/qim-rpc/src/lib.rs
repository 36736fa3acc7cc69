//! # qim-rpc
//!
//! Resolves one inbound call to one of three routes and runs it against a
//! session:
//!
//! - `services`: list every registered service
//! - `service`: describe one service's callable surface
//! - anything else: invoke that method on the requested service
//!
//! The first two are control-plane methods held in a [`registry::ControlRegistry`];
//! their names can never reach a remote service.

#![deny(unsafe_code)]

pub mod dispatch;
pub mod errors;
pub mod handlers;
pub mod introspect;
pub mod registry;

pub use dispatch::Dispatcher;
pub use errors::DispatchError;
