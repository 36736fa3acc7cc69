//! In-process session backend.
//!
//! Services are assembled with [`MemoryService`] and registered on a
//! [`MemoryConnector`]. Every invocation is recorded, and the connector
//! tracks how many sessions are currently open.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::debug;

use crate::errors::SessionError;
use crate::session::{MemberMetadata, Overloads, ServiceProxy, Session, SessionConnector};

/// Async method body: receives the call arguments, returns a value or an error message.
pub type MethodFn =
    Arc<dyn Fn(Option<Vec<Value>>) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

#[derive(Clone)]
struct MemoryMember {
    name: String,
    metadata: MemberMetadata,
    handler: Option<MethodFn>,
}

/// A service definition: documentation plus an ordered set of members.
#[derive(Clone, Default)]
pub struct MemoryService {
    doc: Option<String>,
    members: Vec<MemoryMember>,
}

impl MemoryService {
    /// Empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the service-level documentation.
    #[must_use]
    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = Some(doc.to_owned());
        self
    }

    /// Add a method with a synchronous body and no declared overloads.
    #[must_use]
    pub fn method<F>(self, name: &str, body: F) -> Self
    where
        F: Fn(Option<Vec<Value>>) -> Result<Value, String> + Send + Sync + 'static,
    {
        let body = Arc::new(body);
        self.async_method(name, move |args| {
            let body = Arc::clone(&body);
            async move { body(args) }
        })
    }

    /// Add a method with an async body and no declared overloads.
    #[must_use]
    pub fn async_method<F, Fut>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(Option<Vec<Value>>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, String>> + Send + 'static,
    {
        let handler: MethodFn = Arc::new(move |args| body(args).boxed());
        let member = self.member_mut(name);
        member.handler = Some(handler);
        self
    }

    /// Declare one overload on `name`, creating the member if needed.
    #[must_use]
    pub fn overload(mut self, name: &str, return_type: &str, arg_types: &[&str], doc: &str) -> Self {
        let member = self.member_mut(name);
        let overloads = match std::mem::replace(
            &mut member.metadata,
            MemberMetadata::Available(Overloads::default()),
        ) {
            MemberMetadata::Available(o) => o,
            MemberMetadata::Unavailable(_) => Overloads::default(),
        };
        member.metadata = MemberMetadata::Available(overloads.with(return_type, arg_types, doc));
        self
    }

    /// Replace the metadata of `name` wholesale, creating the member if needed.
    #[must_use]
    pub fn metadata(mut self, name: &str, metadata: MemberMetadata) -> Self {
        self.member_mut(name).metadata = metadata;
        self
    }

    /// Mark `name` as having unreadable metadata.
    #[must_use]
    pub fn opaque(self, name: &str) -> Self {
        self.metadata(
            name,
            MemberMetadata::Unavailable(format!("'{name}' publishes no signatures")),
        )
    }

    fn member_mut(&mut self, name: &str) -> &mut MemoryMember {
        let index = match self.members.iter().position(|m| m.name == name) {
            Some(i) => i,
            None => {
                self.members.push(MemoryMember {
                    name: name.to_owned(),
                    metadata: MemberMetadata::Available(Overloads::default()),
                    handler: None,
                });
                self.members.len() - 1
            }
        };
        &mut self.members[index]
    }
}

/// One recorded invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    /// Service the proxy was obtained for.
    pub service: String,
    /// Invoked member.
    pub method: String,
    /// Arguments exactly as received.
    pub args: Option<Vec<Value>>,
}

#[derive(Default)]
struct Shared {
    services: RwLock<Vec<(String, MemoryService)>>,
    unreachable: RwLock<HashSet<String>>,
    calls: Mutex<Vec<RecordedCall>>,
    open_sessions: AtomicUsize,
    opened_total: AtomicUsize,
}

/// Connector over a shared in-memory service registry.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    /// Connector with no services.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a service.
    #[must_use]
    pub fn with_service(self, name: &str, service: MemoryService) -> Self {
        self.register(name, service);
        self
    }

    /// Register (or replace) a service on a live connector.
    pub fn register(&self, name: &str, service: MemoryService) {
        let mut services = self.shared.services.write();
        if let Some(slot) = services.iter_mut().find(|(n, _)| n == name) {
            slot.1 = service;
        } else {
            services.push((name.to_owned(), service));
        }
    }

    /// Make `connect(url)` fail with a connection error.
    #[must_use]
    pub fn unreachable(self, url: &str) -> Self {
        let _ = self.shared.unreachable.write().insert(url.to_owned());
        self
    }

    /// Invocations recorded so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.shared.calls.lock().clone()
    }

    /// Sessions connected and not yet released.
    pub fn open_sessions(&self) -> usize {
        self.shared.open_sessions.load(Ordering::Acquire)
    }

    /// Sessions connected since creation.
    pub fn sessions_opened(&self) -> usize {
        self.shared.opened_total.load(Ordering::Acquire)
    }
}

#[async_trait]
impl SessionConnector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn Session>, SessionError> {
        if self.shared.unreachable.read().contains(url) {
            return Err(SessionError::Connection {
                url: url.to_owned(),
                message: "connection refused".into(),
            });
        }
        let _ = self.shared.open_sessions.fetch_add(1, Ordering::AcqRel);
        let _ = self.shared.opened_total.fetch_add(1, Ordering::AcqRel);
        debug!(url, "memory session opened");
        Ok(Arc::new(MemorySession {
            shared: Arc::clone(&self.shared),
            open: AtomicBool::new(true),
        }))
    }
}

struct MemorySession {
    shared: Arc<Shared>,
    open: AtomicBool,
}

impl MemorySession {
    fn release(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let _ = self.shared.open_sessions.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn services(&self) -> Result<Vec<String>, SessionError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(SessionError::NotConnected);
        }
        Ok(self
            .shared
            .services
            .read()
            .iter()
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn service(&self, name: &str) -> Result<Arc<dyn ServiceProxy>, SessionError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(SessionError::NotConnected);
        }
        let services = self.shared.services.read();
        let (_, service) = services
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| SessionError::UnknownService(name.to_owned()))?;
        Ok(Arc::new(MemoryProxy {
            name: name.to_owned(),
            service: service.clone(),
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn close(&self) {
        self.release();
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.release();
    }
}

struct MemoryProxy {
    name: String,
    service: MemoryService,
    shared: Arc<Shared>,
}

#[async_trait]
impl ServiceProxy for MemoryProxy {
    fn doc(&self) -> Option<String> {
        self.service.doc.clone()
    }

    fn members(&self) -> Vec<String> {
        self.service.members.iter().map(|m| m.name.clone()).collect()
    }

    fn metadata(&self, member: &str) -> MemberMetadata {
        self.service
            .members
            .iter()
            .find(|m| m.name == member)
            .map_or_else(
                || MemberMetadata::Unavailable(format!("no member named '{member}'")),
                |m| m.metadata.clone(),
            )
    }

    async fn invoke(&self, method: &str, args: Option<Vec<Value>>) -> Result<Value, SessionError> {
        self.shared.calls.lock().push(RecordedCall {
            service: self.name.clone(),
            method: method.to_owned(),
            args: args.clone(),
        });

        let handler = self
            .service
            .members
            .iter()
            .find(|m| m.name == method)
            .and_then(|m| m.handler.clone())
            .ok_or_else(|| SessionError::UnknownMethod {
                service: self.name.clone(),
                method: method.to_owned(),
            })?;

        handler(args).await.map_err(SessionError::Remote)
    }
}
