//! Named-topic event bus
//!
//! A minimal handler registry: handlers are registered under an exact topic
//! string and invoked synchronously, in registration order, when a payload
//! is emitted on that topic. There is no wildcard matching and no
//! unregistration. A failing handler aborts the emit and propagates its
//! error to the caller, which decides whether the failure is fatal.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::Result;

/// A registered message handler
pub type Handler = Box<dyn FnMut(&Value) -> Result<()> + Send>;

/// String-topic publish/subscribe registry
#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<String, Vec<Handler>>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an exact topic
    ///
    /// Multiple handlers may share a topic; they run in registration order.
    pub fn on<F>(&mut self, topic: impl Into<String>, handler: F)
    where
        F: FnMut(&Value) -> Result<()> + Send + 'static,
    {
        self.handlers
            .entry(topic.into())
            .or_default()
            .push(Box::new(handler));
    }

    /// Invoke every handler registered for `topic` with `payload`
    ///
    /// Emitting on a topic with no handlers is a no-op. The first handler
    /// error stops dispatch and is returned.
    pub fn emit(&mut self, topic: &str, payload: &Value) -> Result<()> {
        if let Some(handlers) = self.handlers.get_mut(topic) {
            for handler in handlers.iter_mut() {
                handler(payload)?;
            }
        }
        Ok(())
    }

    /// Number of handlers registered for `topic`
    pub(crate) fn handler_count(&self, topic: &str) -> usize {
        self.handlers.get(topic).map_or(0, Vec::len)
    }

    /// Number of distinct topics with at least one handler
    pub(crate) fn topic_count(&self) -> usize {
        self.handlers.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("topics", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
