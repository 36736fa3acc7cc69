//! Session, connector and service proxy traits.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::SessionError;

/// Opens sessions against a discovery endpoint.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Connect to the endpoint at `url`.
    ///
    /// Fails with [`SessionError::Connection`] when the URL is unusable or
    /// the endpoint does not answer.
    async fn connect(&self, url: &str) -> Result<Arc<dyn Session>, SessionError>;
}

/// A connected session to a service-discovery/RPC backend.
#[async_trait]
pub trait Session: Send + Sync {
    /// Names of all registered services.
    async fn services(&self) -> Result<Vec<String>, SessionError>;

    /// Proxy for the service registered as `name`.
    async fn service(&self, name: &str) -> Result<Arc<dyn ServiceProxy>, SessionError>;

    /// Release the session. Later calls fail with [`SessionError::NotConnected`].
    async fn close(&self);
}

/// Local stand-in for a remote service's callable surface.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ServiceProxy: Send + Sync {
    /// Service-level documentation.
    fn doc(&self) -> Option<String>;

    /// Callable members, in enumeration order.
    fn members(&self) -> Vec<String>;

    /// Overload metadata attached to `member`.
    fn metadata(&self, member: &str) -> MemberMetadata;

    /// Invoke `method`. `None` means "no arguments", distinct from an empty list.
    async fn invoke(&self, method: &str, args: Option<Vec<Value>>) -> Result<Value, SessionError>;
}

/// Result of reading a member's overload metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberMetadata {
    /// Metadata was readable.
    Available(Overloads),
    /// Metadata is missing or could not be read; the reason is for logs only.
    Unavailable(String),
}

/// Raw overload metadata as reported by the backend.
///
/// The three parts are parallel: overload `i` has return type
/// `return_types[i]`, argument types `arg_types[i]`, and its documentation
/// is keyed by that argument-type tuple in `docs`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overloads {
    /// Return type token per overload.
    pub return_types: Vec<String>,
    /// Argument type tokens per overload.
    pub arg_types: Vec<Vec<String>>,
    /// Documentation keyed by argument-type tuple.
    pub docs: HashMap<Vec<String>, String>,
}

impl Overloads {
    /// Append one fully described overload.
    #[must_use]
    pub fn with(mut self, return_type: &str, arg_types: &[&str], doc: &str) -> Self {
        let args: Vec<String> = arg_types.iter().map(|t| (*t).to_owned()).collect();
        self.return_types.push(return_type.to_owned());
        let _ = self.docs.insert(args.clone(), doc.to_owned());
        self.arg_types.push(args);
        self
    }

    /// Number of declared overloads.
    pub fn len(&self) -> usize {
        self.arg_types.len()
    }

    /// Whether no overload is declared.
    pub fn is_empty(&self) -> bool {
        self.arg_types.is_empty()
    }
}
