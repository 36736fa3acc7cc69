//! `service`: describe one service's callable surface.

use async_trait::async_trait;
use qim_core::CallRequest;
use qim_session::Session;
use serde_json::Value;
use tracing::instrument;

use crate::errors::DispatchError;
use crate::introspect::describe;
use crate::registry::ControlHandler;

/// Describes the service named by `args[0]`.
pub struct DescribeServiceHandler;

#[async_trait]
impl ControlHandler for DescribeServiceHandler {
    #[instrument(skip_all, fields(method = "service"))]
    async fn handle(
        &self,
        session: &dyn Session,
        request: &CallRequest,
    ) -> Result<Value, DispatchError> {
        let name = service_name(request)?;
        let proxy = session.service(&name).await?;
        let description = describe(proxy.as_ref(), &name);
        serde_json::to_value(description).map_err(|e| DispatchError::Internal {
            message: format!("failed to encode description: {e}"),
        })
    }
}

/// `args[0]` as a service name. Non-string values use their JSON text.
fn service_name(request: &CallRequest) -> Result<String, DispatchError> {
    match request.args.as_deref().and_then(<[Value]>::first) {
        Some(Value::String(name)) => Ok(name.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(DispatchError::MissingArgument {
            message: "'service' requires the service name as args[0]".into(),
        }),
    }
}
