//! Frame handling: parses inbound `call` events and builds `reply` events.

use qim_core::types::CALL_EVENT;
use qim_core::{CallRequest, CorrelationId, Frame, Reply};
use qim_rpc::{DispatchError, Dispatcher};
use qim_session::Session;
use serde_json::Value;
use tracing::{debug, instrument};

/// An inbound frame that could not be read as a call.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    /// Correlation id, when one could be recovered; otherwise `null`.
    pub idm: CorrelationId,
    /// Always [`DispatchError::InvalidRequest`].
    pub error: DispatchError,
}

impl Rejected {
    fn new(idm: CorrelationId, message: impl Into<String>) -> Self {
        Self {
            idm,
            error: DispatchError::InvalidRequest {
                message: message.into(),
            },
        }
    }

    /// Error reply for this rejection.
    pub fn into_reply(self) -> Reply {
        Reply::failure(self.idm, self.error.to_error_body())
    }
}

/// Parse one text frame into a call.
///
/// Accepts `{"name":"call","args":[idm, {service, method, args}]}` and the
/// object form `{"name":"call","args":[{idm, service, method, args}]}`.
pub fn parse_call(text: &str) -> Result<CallRequest, Rejected> {
    let frame: Frame = serde_json::from_str(text)
        .map_err(|e| Rejected::new(CorrelationId::default(), format!("invalid frame: {e}")))?;

    if frame.name != CALL_EVENT {
        return Err(Rejected::new(
            CorrelationId::default(),
            format!("unsupported event '{}'", frame.name),
        ));
    }

    let mut args = frame.args.into_iter();
    match (args.next(), args.next()) {
        (Some(idm), Some(payload @ Value::Object(_))) => {
            let idm = CorrelationId(idm);
            let mut request: CallRequest = serde_json::from_value(payload)
                .map_err(|e| Rejected::new(idm.clone(), format!("invalid call: {e}")))?;
            request.idm = idm;
            Ok(request)
        }
        (Some(payload @ Value::Object(_)), None) => {
            let idm = CorrelationId(
                payload
                    .get("idm")
                    .or_else(|| payload.get("correlationId"))
                    .cloned()
                    .unwrap_or_default(),
            );
            serde_json::from_value(payload)
                .map_err(|e| Rejected::new(idm, format!("invalid call: {e}")))
        }
        (first, _) => {
            let idm = first.filter(|v| !v.is_object()).unwrap_or_default();
            Err(Rejected::new(
                CorrelationId(idm),
                "call expects [idm, {service, method, args}]",
            ))
        }
    }
}

/// Dispatch `request` and wrap the outcome in a reply carrying its id.
#[instrument(skip_all, fields(method = %request.method))]
pub async fn handle_call(
    request: CallRequest,
    dispatcher: &Dispatcher,
    session: &dyn Session,
) -> Reply {
    debug!(idm = %request.idm.0, service = ?request.service, "dispatching call");
    match dispatcher.dispatch(session, &request).await {
        Ok(result) => Reply::success(request.idm, result),
        Err(err) => Reply::failure(request.idm, err.to_error_body()),
    }
}
