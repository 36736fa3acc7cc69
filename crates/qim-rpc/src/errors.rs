//! Dispatch error kinds and error type.

use qim_core::ErrorBody;
use qim_session::SessionError;

// ── Error kind constants ────────────────────────────────────────────

/// Discovery endpoint unreachable; fails connection establishment.
pub const CONNECTION_ERROR: &str = "CONNECTION_ERROR";
/// Session closed or backend misbehaving.
pub const SESSION_ERROR: &str = "SESSION_ERROR";
/// No service registered under the requested name.
pub const UNKNOWN_SERVICE: &str = "UNKNOWN_SERVICE";
/// Service exists but does not expose the requested method.
pub const UNKNOWN_METHOD: &str = "UNKNOWN_METHOD";
/// A required argument (`args[0]`, `service`) is missing.
pub const MISSING_ARGUMENT: &str = "MISSING_ARGUMENT";
/// The remote method raised.
pub const REMOTE_INVOCATION: &str = "REMOTE_INVOCATION";
/// The configured call timeout elapsed.
pub const TIMEOUT: &str = "TIMEOUT";
/// The inbound frame could not be read as a call.
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
/// Unexpected gateway-side failure.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Error produced while resolving or executing a call.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The session could not be opened.
    #[error("{message}")]
    Connection {
        /// Description.
        message: String,
    },

    /// The session is closed or answered outside the protocol.
    #[error("{message}")]
    Session {
        /// Description.
        message: String,
    },

    /// Unknown service name.
    #[error("unknown service '{name}'")]
    UnknownService {
        /// Requested name.
        name: String,
    },

    /// Unknown method on a known service.
    #[error("service '{service}' has no method '{method}'")]
    UnknownMethod {
        /// Service name.
        service: String,
        /// Requested method.
        method: String,
    },

    /// Required argument absent.
    #[error("{message}")]
    MissingArgument {
        /// What is missing.
        message: String,
    },

    /// Remote method raised.
    #[error("{message}")]
    RemoteInvocation {
        /// Remote-reported message.
        message: String,
    },

    /// Call exceeded the configured timeout.
    #[error("call to '{method}' timed out after {secs}s")]
    Timeout {
        /// Method that timed out.
        method: String,
        /// Timeout that elapsed, in seconds.
        secs: u64,
    },

    /// Malformed inbound frame.
    #[error("{message}")]
    InvalidRequest {
        /// What is wrong with the frame.
        message: String,
    },

    /// Gateway-side failure.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },
}

impl DispatchError {
    /// Machine-readable kind for this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => CONNECTION_ERROR,
            Self::Session { .. } => SESSION_ERROR,
            Self::UnknownService { .. } => UNKNOWN_SERVICE,
            Self::UnknownMethod { .. } => UNKNOWN_METHOD,
            Self::MissingArgument { .. } => MISSING_ARGUMENT,
            Self::RemoteInvocation { .. } => REMOTE_INVOCATION,
            Self::Timeout { .. } => TIMEOUT,
            Self::InvalidRequest { .. } => INVALID_REQUEST,
            Self::Internal { .. } => INTERNAL_ERROR,
        }
    }

    /// Convert to the wire-format error body.
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind().to_owned(),
            detail: self.to_string(),
        }
    }
}

impl From<SessionError> for DispatchError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Connection { .. } => Self::Connection {
                message: err.to_string(),
            },
            SessionError::NotConnected | SessionError::Protocol(_) => Self::Session {
                message: err.to_string(),
            },
            SessionError::UnknownService(name) => Self::UnknownService { name },
            SessionError::UnknownMethod { service, method } => {
                Self::UnknownMethod { service, method }
            }
            SessionError::Remote(message) => Self::RemoteInvocation { message },
        }
    }
}
