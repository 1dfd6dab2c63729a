use std::sync::Arc;

use invoker_core::InvocationContext;

/// Notification points the engine fires during an invocation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginEvent {
    BeforeInvocation,
    AfterInvocation,
    InvocationSuccess,
    InvocationException,
    InvocationFinally,
}

impl PluginEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginEvent::BeforeInvocation => "before_invocation",
            PluginEvent::AfterInvocation => "after_invocation",
            PluginEvent::InvocationSuccess => "on_invocation_success",
            PluginEvent::InvocationException => "on_invocation_exception",
            PluginEvent::InvocationFinally => "invocation_finally",
        }
    }
}

/// Synchronous plugin callbacks.
///
/// Every method defaults to a no-op so a plugin only implements the points it
/// cares about. Handlers run on the invocation's own task and must be cheap.
/// `ctx` is `None` when the attempt failed before its context existed.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn before_invocation(&self, _ctx: &InvocationContext) {}

    fn after_invocation(&self, _ctx: &InvocationContext) {}

    fn on_invocation_success(&self, _ctx: &InvocationContext) {}

    fn on_invocation_exception(&self, _ctx: Option<&InvocationContext>, _cause: &anyhow::Error) {}

    fn invocation_finally(&self, _ctx: Option<&InvocationContext>) {}
}

/// A registered plugin plus its ordering key.
pub struct PluginEntry {
    pub plugin: Arc<dyn Plugin>,
    /// Lower value = notified earlier. Ties broken by registration order.
    pub priority: i32,
}

impl PluginEntry {
    pub fn new(plugin: Arc<dyn Plugin>) -> Self {
        Self { plugin, priority: 0 }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}
