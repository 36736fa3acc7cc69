//! Control-plane method registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use qim_core::CallRequest;
use qim_session::Session;
use serde_json::Value;

use crate::errors::DispatchError;

/// Trait implemented by every control-plane method.
#[async_trait]
pub trait ControlHandler: Send + Sync {
    /// Answer `request` using `session`.
    async fn handle(&self, session: &dyn Session, request: &CallRequest)
    -> Result<Value, DispatchError>;
}

/// Maps reserved method names to the handlers that answer them locally.
pub struct ControlRegistry {
    handlers: HashMap<String, Arc<dyn ControlHandler>>,
}

impl ControlRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, replacing any previous one under the same name.
    pub fn register(&mut self, method: &str, handler: impl ControlHandler + 'static) {
        let _ = self.handlers.insert(method.to_owned(), Arc::new(handler));
    }

    /// Handler registered for `method`.
    pub fn get(&self, method: &str) -> Option<Arc<dyn ControlHandler>> {
        self.handlers.get(method).cloned()
    }

    /// All reserved names (sorted).
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether `method` is reserved.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }
}

impl Default for ControlRegistry {
    fn default() -> Self {
        Self::new()
    }
}
