//! Call routing and execution.

use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use qim_core::CallRequest;
use qim_session::Session;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::DispatchError;
use crate::handlers::register_control;
use crate::registry::ControlRegistry;

/// Calls dispatched, labelled by `method_kind`.
pub const CALLS_TOTAL: &str = "qim_calls_total";
/// Calls that produced an error, labelled by `method_kind` and `error` kind.
pub const CALL_ERRORS_TOTAL: &str = "qim_call_errors_total";
/// Call duration, labelled by `method_kind`.
pub const CALL_DURATION_SECONDS: &str = "qim_call_duration_seconds";

/// `method_kind` of calls forwarded to a remote service.
const INVOKE_ROUTE: &str = "invoke";

const SLOW_CALL: Duration = Duration::from_secs(5);

/// Routes calls to control-plane handlers or to remote invocation.
///
/// Holds no per-connection state; one instance is shared by every
/// connection and every in-flight call.
pub struct Dispatcher {
    registry: ControlRegistry,
    call_timeout: Option<Duration>,
}

impl Dispatcher {
    /// Dispatcher with the `services` and `service` methods and no timeout.
    pub fn new() -> Self {
        let mut registry = ControlRegistry::new();
        register_control(&mut registry);
        Self {
            registry,
            call_timeout: None,
        }
    }

    /// Bound every call by `timeout` (`None` waits indefinitely).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Configured call timeout.
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }

    /// Control-plane methods answered locally.
    pub fn registry(&self) -> &ControlRegistry {
        &self.registry
    }

    /// Run one call against `session`.
    ///
    /// Reserved method names never reach a remote service, whatever
    /// `service` says.
    pub async fn dispatch(
        &self,
        session: &dyn Session,
        request: &CallRequest,
    ) -> Result<Value, DispatchError> {
        let route = self.route(&request.method);
        counter!(CALLS_TOTAL, "method_kind" => route.clone()).increment(1);

        let start = Instant::now();
        let result = match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(session, request))
                .await
                .unwrap_or_else(|_elapsed| {
                    Err(DispatchError::Timeout {
                        method: request.method.clone(),
                        secs: limit.as_secs(),
                    })
                }),
            None => self.run(session, request).await,
        };

        let duration = start.elapsed();
        histogram!(CALL_DURATION_SECONDS, "method_kind" => route.clone())
            .record(duration.as_secs_f64());

        if let Err(err) = &result {
            counter!(CALL_ERRORS_TOTAL, "method_kind" => route.clone(), "error" => err.kind())
                .increment(1);
            debug!(method_kind = %route, method = %request.method, kind = err.kind(), error = %err, "call failed");
        }

        if duration >= SLOW_CALL {
            warn!(
                method_kind = %route,
                method = %request.method,
                duration_secs = duration.as_secs_f64(),
                "slow call"
            );
        }

        result
    }

    fn route(&self, method: &str) -> String {
        if self.registry.has_method(method) {
            method.to_owned()
        } else {
            INVOKE_ROUTE.to_owned()
        }
    }

    async fn run(
        &self,
        session: &dyn Session,
        request: &CallRequest,
    ) -> Result<Value, DispatchError> {
        match self.registry.get(&request.method) {
            Some(handler) => handler.handle(session, request).await,
            None => invoke(session, request).await,
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward `request` to its target service, arguments passed through untouched.
async fn invoke(session: &dyn Session, request: &CallRequest) -> Result<Value, DispatchError> {
    let service = request
        .service
        .as_deref()
        .ok_or_else(|| DispatchError::MissingArgument {
            message: format!("call to '{}' names no service", request.method),
        })?;
    let proxy = session.service(service).await?;
    let value = proxy.invoke(&request.method, request.args.clone()).await?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{
        MISSING_ARGUMENT, REMOTE_INVOCATION, SESSION_ERROR, TIMEOUT, UNKNOWN_METHOD,
        UNKNOWN_SERVICE,
    };
    use crate::handlers::test_helpers::{make_test_connector, open};
    use qim_session::memory::{MemoryConnector, MemoryService};
    use serde_json::json;

    fn invoke_request(service: &str, method: &str, args: Option<Vec<Value>>) -> CallRequest {
        let request = CallRequest::new("1", method).with_service(service);
        match args {
            Some(args) => request.with_args(args),
            None => request,
        }
    }

    // ── Routing ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn services_route() {
        let connector = make_test_connector();
        let session = open(&connector).await;
        let out = Dispatcher::new()
            .dispatch(session.as_ref(), &CallRequest::new("1", "services"))
            .await
            .unwrap();
        assert_eq!(out, json!(["Calc", "Echo"]));
    }

    #[tokio::test]
    async fn service_route() {
        let connector = make_test_connector();
        let session = open(&connector).await;
        let request = CallRequest::new("1", "service").with_args(vec![json!("Calc")]);
        let out = Dispatcher::new()
            .dispatch(session.as_ref(), &request)
            .await
            .unwrap();
        assert_eq!(out["name"], "Calc");
    }

    #[tokio::test]
    async fn invoke_route_returns_remote_value() {
        let connector = make_test_connector();
        let session = open(&connector).await;
        let out = Dispatcher::new()
            .dispatch(
                session.as_ref(),
                &invoke_request("Calc", "add", Some(vec![json!(2), json!(3)])),
            )
            .await
            .unwrap();
        assert_eq!(out, json!(5));
    }

    #[tokio::test]
    async fn reserved_names_never_reach_remote() {
        let connector = MemoryConnector::new().with_service(
            "Svc",
            MemoryService::new()
                .method("services", |_| Ok(json!("remote")))
                .method("service", |_| Ok(json!("remote"))),
        );
        let session = open(&connector).await;
        let dispatcher = Dispatcher::new();

        let listed = dispatcher
            .dispatch(
                session.as_ref(),
                &CallRequest::new("1", "services").with_service("Svc"),
            )
            .await
            .unwrap();
        assert_eq!(listed, json!(["Svc"]));

        let described = dispatcher
            .dispatch(
                session.as_ref(),
                &invoke_request("Svc", "service", Some(vec![json!("Svc")])),
            )
            .await
            .unwrap();
        assert_eq!(described["name"], "Svc");
        assert!(connector.calls().is_empty());
    }

    // ── Argument pass-through ───────────────────────────────────────

    #[tokio::test]
    async fn absent_and_empty_args_stay_distinct() {
        let connector = make_test_connector();
        let session = open(&connector).await;
        let dispatcher = Dispatcher::new();

        let _ = dispatcher
            .dispatch(session.as_ref(), &invoke_request("Echo", "echo", None))
            .await
            .unwrap();
        let _ = dispatcher
            .dispatch(session.as_ref(), &invoke_request("Echo", "echo", Some(vec![])))
            .await
            .unwrap();

        let calls = connector.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args, None);
        assert_eq!(calls[1].args, Some(vec![]));
    }

    #[tokio::test]
    async fn structured_args_pass_unconverted() {
        let connector = make_test_connector();
        let session = open(&connector).await;
        let args = vec![json!({"a": [1, 2, {"b": null}]}), json!(1.5), json!(true)];

        let out = Dispatcher::new()
            .dispatch(
                session.as_ref(),
                &invoke_request("Echo", "echo", Some(args.clone())),
            )
            .await
            .unwrap();

        assert_eq!(out, Value::Array(args.clone()));
        assert_eq!(connector.calls()[0].args, Some(args));
    }

    // ── Error kinds ─────────────────────────────────────────────────

    #[tokio::test]
    async fn unknown_service_kind() {
        let connector = make_test_connector();
        let session = open(&connector).await;
        let err = Dispatcher::new()
            .dispatch(session.as_ref(), &invoke_request("Nope", "x", None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), UNKNOWN_SERVICE);
    }

    #[tokio::test]
    async fn unknown_method_kind() {
        let connector = make_test_connector();
        let session = open(&connector).await;
        let err = Dispatcher::new()
            .dispatch(session.as_ref(), &invoke_request("Calc", "mul", None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), UNKNOWN_METHOD);
    }

    #[tokio::test]
    async fn remote_error_kind_and_message() {
        let connector = make_test_connector();
        let session = open(&connector).await;
        let err = Dispatcher::new()
            .dispatch(
                session.as_ref(),
                &invoke_request("Calc", "div", Some(vec![json!(1), json!(0)])),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), REMOTE_INVOCATION);
        assert_eq!(err.to_string(), "division by zero");
    }

    #[tokio::test]
    async fn missing_service_for_invoke() {
        let connector = make_test_connector();
        let session = open(&connector).await;
        let err = Dispatcher::new()
            .dispatch(session.as_ref(), &CallRequest::new("1", "add"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), MISSING_ARGUMENT);
        assert!(connector.calls().is_empty());
    }

    #[tokio::test]
    async fn closed_session_kind() {
        let connector = make_test_connector();
        let session = open(&connector).await;
        session.close().await;
        let err = Dispatcher::new()
            .dispatch(session.as_ref(), &invoke_request("Calc", "add", None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), SESSION_ERROR);
    }

    // ── Timeout ─────────────────────────────────────────────────────

    fn slow_connector() -> MemoryConnector {
        MemoryConnector::new().with_service(
            "Slow",
            MemoryService::new().async_method("wait", |_| async {
                tokio::time::sleep(Duration::from_secs(120)).await;
                Ok(json!("done"))
            }),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_yields_timeout_error() {
        let connector = slow_connector();
        let session = open(&connector).await;
        let dispatcher = Dispatcher::new().with_timeout(Some(Duration::from_secs(5)));

        let err = dispatcher
            .dispatch(session.as_ref(), &invoke_request("Slow", "wait", None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), TIMEOUT);
        assert!(err.to_string().contains("wait"));
    }

    #[tokio::test(start_paused = true)]
    async fn no_timeout_waits_for_completion() {
        let connector = slow_connector();
        let session = open(&connector).await;
        let dispatcher = Dispatcher::new();
        assert!(dispatcher.call_timeout().is_none());

        let out = dispatcher
            .dispatch(session.as_ref(), &invoke_request("Slow", "wait", None))
            .await
            .unwrap();
        assert_eq!(out, json!("done"));
    }

    #[test]
    fn default_has_control_methods() {
        let dispatcher = Dispatcher::default();
        assert!(dispatcher.registry().has_method("services"));
        assert!(dispatcher.registry().has_method("service"));
        assert!(!dispatcher.registry().has_method("invoke"));
    }
}
