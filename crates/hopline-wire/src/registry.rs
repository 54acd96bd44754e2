//! Action registry: maps action names to their reader and handler.
//!
//! Registration happens once, while a node is being assembled, through an
//! [`ActionRegistryBuilder`]. [`ActionRegistryBuilder::build`] freezes the
//! table into an [`ActionRegistry`] that is shared by every connection task
//! without locking.

use crate::error::WireError;
use crate::proxy::is_proxy_action;
use crate::transport::{handler_fn, Executor, RequestHandler, RequestReader, TransportChannel};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A handler installed for one action.
#[derive(Clone)]
pub struct RegisteredAction {
    /// The action name requests are addressed to.
    pub action: String,
    /// Decodes the request body before the handler sees it.
    pub reader: RequestReader,
    /// Where the handler runs.
    pub executor: Executor,
    pub handler: Arc<dyn RequestHandler>,
}

impl fmt::Debug for RegisteredAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredAction")
            .field("action", &self.action)
            .field("reader", &self.reader)
            .field("executor", &self.executor)
            .finish()
    }
}

/// Collects registrations before a node starts.
#[derive(Debug, Default)]
pub struct ActionRegistryBuilder {
    actions: HashMap<String, RegisteredAction>,
}

impl ActionRegistryBuilder {
    /// Install `handler` for `action`.
    ///
    /// Each action may be registered once; a second registration is a
    /// configuration error.
    pub fn register_handler(
        &mut self,
        action: impl Into<String>,
        reader: RequestReader,
        executor: Executor,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<&mut Self, WireError> {
        let action = action.into();
        if self.actions.contains_key(&action) {
            return Err(WireError::DuplicateAction(action));
        }
        debug!(action = %action, reader = reader.type_name(), ?executor, "Registered action");
        self.actions.insert(
            action.clone(),
            RegisteredAction {
                action,
                reader,
                executor,
                handler,
            },
        );
        Ok(self)
    }

    /// Register a closure over a JSON-decoded request of type `T`.
    pub fn register<T, F>(
        &mut self,
        action: impl Into<String>,
        executor: Executor,
        f: F,
    ) -> Result<&mut Self, WireError>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T, Box<dyn TransportChannel>) + Send + Sync + 'static,
    {
        self.register_handler(action, RequestReader::of::<T>(), executor, handler_fn(f))
    }

    /// The request reader of an already registered action.
    pub fn request_reader(&self, action: &str) -> Option<RequestReader> {
        self.actions.get(action).map(|a| a.reader.clone())
    }

    pub fn contains(&self, action: &str) -> bool {
        self.actions.contains_key(action)
    }

    /// Freeze the registrations.
    pub fn build(self) -> ActionRegistry {
        ActionRegistry {
            actions: Arc::new(self.actions),
        }
    }
}

/// Read-only table of registered actions.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: Arc<HashMap<String, RegisteredAction>>,
}

impl ActionRegistry {
    pub fn builder() -> ActionRegistryBuilder {
        ActionRegistryBuilder::default()
    }

    /// Look up the registration for an action.
    pub fn get(&self, action: &str) -> Option<&RegisteredAction> {
        self.actions.get(action)
    }

    /// All registered action names, sorted.
    pub fn actions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered proxy action names, sorted.
    pub fn proxy_actions(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .actions
            .keys()
            .filter(|a| is_proxy_action(a))
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
