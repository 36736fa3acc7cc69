//! Session error type.

use thiserror::Error;

/// Errors reported by a session backend.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The discovery endpoint could not be reached or the URL is unusable.
    #[error("cannot connect to {url}: {message}")]
    Connection {
        /// Discovery URL that was dialed.
        url: String,
        /// Underlying failure.
        message: String,
    },

    /// The session was closed.
    #[error("session is not connected")]
    NotConnected,

    /// No service is registered under this name.
    #[error("unknown service '{0}'")]
    UnknownService(String),

    /// The service exists but does not expose this member.
    #[error("service '{service}' has no method '{method}'")]
    UnknownMethod {
        /// Service name.
        service: String,
        /// Requested member.
        method: String,
    },

    /// The remote method raised; carries the remote-reported message.
    #[error("{0}")]
    Remote(String),

    /// The backend answered with something that does not follow the protocol.
    #[error("malformed response from discovery endpoint: {0}")]
    Protocol(String),
}
