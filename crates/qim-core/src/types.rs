//! Socket channel wire types.
//!
//! Frames follow the socket.io event encoding: an event `name` plus a list
//! of positional `args`. A browser sends `call` frames and receives `reply`
//! frames carrying the caller's correlation id (`idm`) back unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound event carrying a [`CallRequest`].
pub const CALL_EVENT: &str = "call";
/// Outbound event carrying a [`Reply`].
pub const REPLY_EVENT: &str = "reply";
/// Outbound event sent once when the connection cannot be opened.
pub const ERROR_EVENT: &str = "error";

/// Caller-chosen token linking a [`Reply`] to its [`CallRequest`].
///
/// Any JSON value is accepted and echoed back untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub Value);

impl From<Value> for CorrelationId {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(Value::String(value.to_owned()))
    }
}

impl From<u64> for CorrelationId {
    fn from(value: u64) -> Self {
        Self(Value::from(value))
    }
}

/// One event on the socket channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Event name (`call`, `reply`, `error`).
    pub name: String,
    /// Positional event arguments.
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Frame {
    /// Build a frame from an event name and its arguments.
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Wrap a reply in a `reply` event.
    pub fn reply(reply: &Reply) -> serde_json::Result<Self> {
        Ok(Self::new(REPLY_EVENT, vec![serde_json::to_value(reply)?]))
    }

    /// Wrap a connection-level error in an `error` event.
    pub fn error(body: &ErrorBody) -> serde_json::Result<Self> {
        Ok(Self::new(ERROR_EVENT, vec![serde_json::to_value(body)?]))
    }

    /// Serialize to the JSON text sent over the socket.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A request to list services, describe one, or invoke a method.
///
/// `args: None` (field absent or `null`) and `args: Some(vec![])` are
/// distinct and both reach the remote call as given.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Correlation id, echoed on the reply.
    #[serde(rename = "idm", alias = "correlationId", default)]
    pub idm: CorrelationId,
    /// Target service (ignored by the control-plane methods).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Method name.
    pub method: String,
    /// Positional arguments, passed through unconverted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
}

impl CallRequest {
    /// Request with no service and no arguments.
    pub fn new(idm: impl Into<CorrelationId>, method: impl Into<String>) -> Self {
        Self {
            idm: idm.into(),
            service: None,
            method: method.into(),
            args: None,
        }
    }

    /// Set the target service.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Set the argument list.
    #[must_use]
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = Some(args);
        self
    }
}

/// Machine-readable error carried by a failed [`Reply`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error kind code (e.g. `UNKNOWN_SERVICE`).
    pub kind: String,
    /// Human-readable detail.
    pub detail: String,
}

/// Outcome of a call: exactly one of `result` or `error`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyOutcome {
    /// Value returned by the dispatcher.
    Result(Value),
    /// Dispatch failure.
    Error(ErrorBody),
}

/// Response to one [`CallRequest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Echoed correlation id.
    pub idm: CorrelationId,
    /// `result` or `error`, flattened next to `idm`.
    #[serde(flatten)]
    pub outcome: ReplyOutcome,
}

impl Reply {
    /// Build a success reply.
    pub fn success(idm: CorrelationId, result: Value) -> Self {
        Self {
            idm,
            outcome: ReplyOutcome::Result(result),
        }
    }

    /// Build an error reply.
    pub fn failure(idm: CorrelationId, error: ErrorBody) -> Self {
        Self {
            idm,
            outcome: ReplyOutcome::Error(error),
        }
    }

    /// Whether the call succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ReplyOutcome::Result(_))
    }
}

/// Callable surface of one remote service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescription {
    /// Name the caller asked for.
    pub name: String,
    /// Service-level documentation, `null` when the proxy has none.
    pub doc: Option<String>,
    /// Successfully described members, in proxy enumeration order.
    pub functions: Vec<FunctionDescription>,
}

/// One member and its overloads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescription {
    /// Member name.
    pub name: String,
    /// One entry per overload; empty when the member has none.
    pub signatures: Vec<Signature>,
}

/// One overload of a member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    /// Return type token.
    pub return_type: String,
    /// Argument type tokens, in order.
    pub arg_types: Vec<String>,
    /// Documentation attached to this argument-type tuple.
    pub arg_docs: String,
}
