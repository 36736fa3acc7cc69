//! JSON-over-HTTP session client.
//!
//! Endpoints, relative to the discovery URL:
//!
//! - `GET  services`               → `["name", ...]`
//! - `GET  services/{name}`        → service descriptor, 404 when unknown
//! - `POST services/{name}/call`   → `{"method", "args"?}` → `{"result"}` or `{"error"}`

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::errors::SessionError;
use crate::session::{MemberMetadata, Overloads, ServiceProxy, Session, SessionConnector};

/// Connector producing [`HttpSession`]s.
#[derive(Clone, Debug, Default)]
pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    /// Connector with a default `reqwest` client.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionConnector for HttpConnector {
    #[instrument(skip(self))]
    async fn connect(&self, url: &str) -> Result<Arc<dyn Session>, SessionError> {
        let connection_error = |message: String| SessionError::Connection {
            url: url.to_owned(),
            message,
        };

        let base = Url::parse(url).map_err(|e| connection_error(e.to_string()))?;
        let session = HttpSession {
            client: self.client.clone(),
            base,
            connected: AtomicBool::new(true),
        };

        // Reachability probe; anything short of a service list fails the connect.
        let names = session
            .fetch_services()
            .await
            .map_err(|e| connection_error(e.to_string()))?;
        debug!(service_count = names.len(), "session connected");

        Ok(Arc::new(session))
    }
}

/// Session bound to one discovery URL.
#[derive(Debug)]
pub struct HttpSession {
    client: Client,
    base: Url,
    connected: AtomicBool,
}

impl HttpSession {
    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    async fn fetch_services(&self) -> Result<Vec<String>, SessionError> {
        let url = endpoint(&self.base, &["services"])?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SessionError::Protocol(format!(
                "listing services returned {}",
                resp.status()
            )));
        }
        resp.json::<Vec<String>>()
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl Session for HttpSession {
    async fn services(&self) -> Result<Vec<String>, SessionError> {
        self.ensure_connected()?;
        self.fetch_services().await
    }

    #[instrument(skip(self))]
    async fn service(&self, name: &str) -> Result<Arc<dyn ServiceProxy>, SessionError> {
        self.ensure_connected()?;
        let url = endpoint(&self.base, &["services", name])?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(SessionError::UnknownService(name.to_owned()));
        }
        if !resp.status().is_success() {
            return Err(SessionError::Protocol(format!(
                "describing '{name}' returned {}",
                resp.status()
            )));
        }

        let descriptor: ServiceDescriptor = resp
            .json()
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))?;

        Ok(Arc::new(HttpProxy {
            client: self.client.clone(),
            call_url: endpoint(&self.base, &["services", name, "call"])?,
            service: name.to_owned(),
            doc: descriptor.doc.as_ref().and_then(Value::as_str).map(str::to_owned),
            members: descriptor
                .members
                .into_iter()
                .filter_map(MemberDescriptor::parse)
                .collect(),
        }))
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

/// Append path segments to the discovery URL.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, SessionError> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| SessionError::Protocol(format!("{base} cannot be a base URL")))?;
        let _ = path.pop_if_empty().extend(segments);
    }
    Ok(url)
}

/// Service descriptor as served. Members stay raw so that one malformed
/// entry cannot fail the whole lookup.
#[derive(Debug, Deserialize)]
struct ServiceDescriptor {
    #[serde(default)]
    doc: Option<Value>,
    #[serde(default)]
    members: Vec<Value>,
}

/// Overload tables of one member; any of them may be missing.
#[derive(Debug, Deserialize)]
struct SignatureTables {
    #[serde(default)]
    sigreturns: Option<Vec<String>>,
    #[serde(default)]
    signatures: Option<Vec<Vec<String>>>,
    #[serde(default)]
    docs: Option<Vec<DocEntry>>,
}

#[derive(Debug, Deserialize)]
struct DocEntry {
    signature: Vec<String>,
    doc: String,
}

#[derive(Debug)]
struct MemberDescriptor {
    name: String,
    metadata: MemberMetadata,
}

impl MemberDescriptor {
    /// Read one raw member. Entries without a name cannot be addressed and
    /// are skipped; unreadable tables make the member `Unavailable`.
    fn parse(raw: Value) -> Option<Self> {
        let Some(name) = raw.get("name").and_then(Value::as_str).map(str::to_owned) else {
            debug!(member = %raw, "skipping unnamed member");
            return None;
        };
        let metadata = match serde_json::from_value::<SignatureTables>(raw) {
            Ok(tables) => tables.into_metadata(&name),
            Err(e) => MemberMetadata::Unavailable(format!("malformed metadata for '{name}': {e}")),
        };
        Some(Self { name, metadata })
    }
}

impl SignatureTables {
    fn into_metadata(self, name: &str) -> MemberMetadata {
        let (Some(return_types), Some(arg_types), Some(docs)) =
            (self.sigreturns, self.signatures, self.docs)
        else {
            return MemberMetadata::Unavailable(format!(
                "'{name}' does not publish complete signature metadata"
            ));
        };
        let docs: HashMap<Vec<String>, String> = docs
            .into_iter()
            .map(|entry| (entry.signature, entry.doc))
            .collect();
        MemberMetadata::Available(Overloads {
            return_types,
            arg_types,
            docs,
        })
    }
}

#[derive(Serialize)]
struct CallBody<'a> {
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<&'a [Value]>,
}

#[derive(Deserialize)]
struct CallSuccess {
    #[serde(default)]
    result: Value,
}

#[derive(Deserialize)]
struct CallFailure {
    error: String,
}

/// Proxy for one service, holding the descriptor fetched at lookup time.
#[derive(Debug)]
struct HttpProxy {
    client: Client,
    call_url: Url,
    service: String,
    doc: Option<String>,
    members: Vec<MemberDescriptor>,
}

#[async_trait]
impl ServiceProxy for HttpProxy {
    fn doc(&self) -> Option<String> {
        self.doc.clone()
    }

    fn members(&self) -> Vec<String> {
        self.members.iter().map(|m| m.name.clone()).collect()
    }

    fn metadata(&self, member: &str) -> MemberMetadata {
        self.members
            .iter()
            .find(|m| m.name == member)
            .map_or_else(
                || MemberMetadata::Unavailable(format!("no member named '{member}'")),
                |m| m.metadata.clone(),
            )
    }

    #[instrument(skip(self, args), fields(service = %self.service))]
    async fn invoke(&self, method: &str, args: Option<Vec<Value>>) -> Result<Value, SessionError> {
        let body = CallBody {
            method,
            args: args.as_deref(),
        };
        let resp = self
            .client
            .post(self.call_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            let success: CallSuccess = resp
                .json()
                .await
                .map_err(|e| SessionError::Protocol(e.to_string()))?;
            return Ok(success.result);
        }

        let message = match resp.json::<CallFailure>().await {
            Ok(failure) => failure.error,
            Err(_) => format!("remote call failed with {status}"),
        };
        warn!(method, %status, error = %message, "remote invocation failed");
        if status == StatusCode::NOT_FOUND {
            return Err(SessionError::UnknownMethod {
                service: self.service.clone(),
                method: method.to_owned(),
            });
        }
        Err(SessionError::Remote(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_with_services(names: Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sd/services"))
            .respond_with(ResponseTemplate::new(200).set_body_json(names))
            .mount(&server)
            .await;
        server
    }

    async fn connect(server: &MockServer) -> Arc<dyn Session> {
        HttpConnector::new()
            .connect(&format!("{}/sd", server.uri()))
            .await
            .unwrap()
    }

    fn calc_descriptor() -> Value {
        json!({
            "doc": "Arithmetic",
            "members": [
                {
                    "name": "add",
                    "sigreturns": ["i", "d"],
                    "signatures": [["i", "i"], ["d", "d"]],
                    "docs": [
                        {"signature": ["i", "i"], "doc": "add ints"},
                        {"signature": ["d", "d"], "doc": "add doubles"}
                    ]
                },
                {"name": "secret"}
            ]
        })
    }

    // ── connect ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn connect_probes_service_list() {
        let server = server_with_services(json!(["Calc"])).await;
        let session = connect(&server).await;
        assert_eq!(session.services().await.unwrap(), vec!["Calc"]);
    }

    #[tokio::test]
    async fn connect_fails_on_bad_url() {
        let err = HttpConnector::new().connect("not a url").await.err().unwrap();
        assert!(matches!(err, SessionError::Connection { .. }));
    }

    #[tokio::test]
    async fn connect_fails_on_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sd/services"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let err = HttpConnector::new()
            .connect(&format!("{}/sd", server.uri()))
            .await
            .err()
            .unwrap();
        match err {
            SessionError::Connection { message, .. } => assert!(message.contains("503")),
            other => panic!("expected connection error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connect_fails_when_unreachable() {
        let err = HttpConnector::new()
            .connect("http://127.0.0.1:1/sd")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SessionError::Connection { .. }));
    }

    // ── service lookup ──────────────────────────────────────────────

    #[tokio::test]
    async fn unknown_service_maps_404() {
        let server = server_with_services(json!([])).await;
        Mock::given(method("GET"))
            .and(path("/sd/services/Nope"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let session = connect(&server).await;
        let err = session.service("Nope").await.err().unwrap();
        assert_eq!(err, SessionError::UnknownService("Nope".into()));
    }

    #[tokio::test]
    async fn proxy_exposes_descriptor_metadata() {
        let server = server_with_services(json!(["Calc"])).await;
        Mock::given(method("GET"))
            .and(path("/sd/services/Calc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(calc_descriptor()))
            .mount(&server)
            .await;
        let session = connect(&server).await;
        let proxy = session.service("Calc").await.unwrap();

        assert_eq!(proxy.doc().as_deref(), Some("Arithmetic"));
        assert_eq!(proxy.members(), vec!["add", "secret"]);
        match proxy.metadata("add") {
            MemberMetadata::Available(o) => {
                assert_eq!(o.return_types, vec!["i", "d"]);
                assert_eq!(o.docs[&vec!["d".to_owned(), "d".to_owned()]], "add doubles");
            }
            MemberMetadata::Unavailable(reason) => panic!("unexpected: {reason}"),
        }
        assert!(matches!(proxy.metadata("secret"), MemberMetadata::Unavailable(_)));
        assert!(matches!(proxy.metadata("missing"), MemberMetadata::Unavailable(_)));
    }

    #[tokio::test]
    async fn malformed_member_does_not_fail_lookup() {
        let server = server_with_services(json!(["Calc"])).await;
        Mock::given(method("GET"))
            .and(path("/sd/services/Calc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "doc": 7,
                "members": [
                    calc_descriptor()["members"][0].clone(),
                    {"name": "weird", "sigreturns": 5},
                    {
                        "name": "undocumented",
                        "sigreturns": ["i"],
                        "signatures": [["i"]],
                        "docs": [{"signature": ["i"]}]
                    },
                    {"sigreturns": ["i"]}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sd/services/Calc/call"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": 4})))
            .mount(&server)
            .await;

        let session = connect(&server).await;
        let proxy = session.service("Calc").await.unwrap();

        assert!(proxy.doc().is_none());
        assert_eq!(proxy.members(), vec!["add", "weird", "undocumented"]);
        assert!(matches!(proxy.metadata("add"), MemberMetadata::Available(_)));
        match proxy.metadata("weird") {
            MemberMetadata::Unavailable(reason) => assert!(reason.contains("weird")),
            MemberMetadata::Available(o) => panic!("unexpected overloads {o:?}"),
        }
        assert!(matches!(
            proxy.metadata("undocumented"),
            MemberMetadata::Unavailable(_)
        ));
        assert_eq!(
            proxy.invoke("add", Some(vec![json!(2), json!(2)])).await.unwrap(),
            json!(4)
        );
    }

    // ── invoke ──────────────────────────────────────────────────────

    async fn calc_proxy(server: &MockServer) -> Arc<dyn ServiceProxy> {
        Mock::given(method("GET"))
            .and(path("/sd/services/Calc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(calc_descriptor()))
            .mount(server)
            .await;
        connect(server).await.service("Calc").await.unwrap()
    }

    #[tokio::test]
    async fn invoke_posts_args_and_returns_result() {
        let server = server_with_services(json!(["Calc"])).await;
        Mock::given(method("POST"))
            .and(path("/sd/services/Calc/call"))
            .and(body_json(json!({"method": "add", "args": [1, 2]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": 3})))
            .expect(1)
            .mount(&server)
            .await;
        let proxy = calc_proxy(&server).await;
        let value = proxy
            .invoke("add", Some(vec![json!(1), json!(2)]))
            .await
            .unwrap();
        assert_eq!(value, json!(3));
    }

    #[tokio::test]
    async fn invoke_without_args_omits_field() {
        let server = server_with_services(json!(["Calc"])).await;
        Mock::given(method("POST"))
            .and(path("/sd/services/Calc/call"))
            .and(body_json(json!({"method": "reset"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": null})))
            .expect(1)
            .mount(&server)
            .await;
        let proxy = calc_proxy(&server).await;
        assert_eq!(proxy.invoke("reset", None).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn invoke_with_empty_args_sends_empty_list() {
        let server = server_with_services(json!(["Calc"])).await;
        Mock::given(method("POST"))
            .and(path("/sd/services/Calc/call"))
            .and(body_json(json!({"method": "reset", "args": []})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "empty"})))
            .expect(1)
            .mount(&server)
            .await;
        let proxy = calc_proxy(&server).await;
        assert_eq!(proxy.invoke("reset", Some(vec![])).await.unwrap(), "empty");
    }

    #[tokio::test]
    async fn invoke_surfaces_remote_message() {
        let server = server_with_services(json!(["Calc"])).await;
        Mock::given(method("POST"))
            .and(path("/sd/services/Calc/call"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"error": "division by zero"})),
            )
            .mount(&server)
            .await;
        let proxy = calc_proxy(&server).await;
        let err = proxy.invoke("div", Some(vec![json!(1), json!(0)])).await;
        assert_eq!(err, Err(SessionError::Remote("division by zero".into())));
    }

    #[tokio::test]
    async fn invoke_unknown_method_maps_404() {
        let server = server_with_services(json!(["Calc"])).await;
        Mock::given(method("POST"))
            .and(path("/sd/services/Calc/call"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "no pow"})))
            .mount(&server)
            .await;
        let proxy = calc_proxy(&server).await;
        let err = proxy.invoke("pow", None).await.err().unwrap();
        assert!(matches!(err, SessionError::UnknownMethod { .. }));
    }

    #[tokio::test]
    async fn invoke_transport_failure_is_protocol_error() {
        let proxy = HttpProxy {
            client: Client::new(),
            call_url: Url::parse("http://127.0.0.1:1/sd/services/Calc/call").unwrap(),
            service: "Calc".into(),
            doc: None,
            members: Vec::new(),
        };
        let err = proxy.invoke("add", None).await.unwrap_err();
        assert!(matches!(err, SessionError::Protocol(_)), "got {err:?}");
    }

    // ── close ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn closed_session_rejects_calls() {
        let server = server_with_services(json!(["Calc"])).await;
        let session = connect(&server).await;
        session.close().await;
        assert_eq!(session.services().await, Err(SessionError::NotConnected));
        assert_eq!(
            session.service("Calc").await.err(),
            Some(SessionError::NotConnected)
        );
    }

    #[test]
    fn endpoint_appends_segments() {
        let base = Url::parse("http://sd:5555/root/").unwrap();
        let url = endpoint(&base, &["services", "My Service", "call"]).unwrap();
        assert_eq!(url.as_str(), "http://sd:5555/root/services/My%20Service/call");
    }
}
