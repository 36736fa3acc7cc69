//! `services`: list registered service names.

use async_trait::async_trait;
use qim_core::CallRequest;
use qim_session::Session;
use serde_json::Value;
use tracing::instrument;

use crate::errors::DispatchError;
use crate::registry::ControlHandler;

/// Returns every registered service name as a JSON array. Arguments are ignored.
pub struct ListServicesHandler;

#[async_trait]
impl ControlHandler for ListServicesHandler {
    #[instrument(skip_all, fields(method = "services"))]
    async fn handle(
        &self,
        session: &dyn Session,
        _request: &CallRequest,
    ) -> Result<Value, DispatchError> {
        let names = session.services().await?;
        Ok(Value::from(names))
    }
}
