use std::sync::{Arc, RwLock};
use std::time::Instant;

use invoker_core::InvocationContext;
use tracing::debug;

use crate::types::{Plugin, PluginEntry, PluginEvent};

/// Ordered set of plugins the engine notifies around each invocation.
///
/// A single registry is shared by both dispatchers (pass as Arc<PluginRegistry>).
pub struct PluginRegistry {
    /// Sorted by priority ascending after every registration.
    plugins: RwLock<Vec<PluginEntry>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: RwLock::new(Vec::new()),
        }
    }

    /// Register a plugin. Re-sorts the list so priority order is always correct.
    pub fn register(&self, entry: PluginEntry) {
        let name = entry.plugin.name().to_string();
        let mut plugins = self.plugins.write().expect("plugin registry poisoned");
        plugins.push(entry);
        // Stable sort preserves registration order within the same priority.
        plugins.sort_by_key(|p| p.priority);
        debug!(plugin = %name, "plugin registered");
    }

    /// Remove a plugin by name. Silent no-op if the name is not found.
    pub fn unregister(&self, name: &str) {
        let mut plugins = self.plugins.write().expect("plugin registry poisoned");
        let before = plugins.len();
        plugins.retain(|p| p.plugin.name() != name);
        if plugins.len() < before {
            debug!(plugin = name, "plugin unregistered");
        }
    }

    pub fn len(&self) -> usize {
        self.plugins.read().expect("plugin registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn before_invocation(&self, ctx: &InvocationContext) {
        self.notify(PluginEvent::BeforeInvocation, |p| p.before_invocation(ctx));
    }

    pub fn after_invocation(&self, ctx: &InvocationContext) {
        self.notify(PluginEvent::AfterInvocation, |p| p.after_invocation(ctx));
    }

    pub fn on_invocation_success(&self, ctx: &InvocationContext) {
        self.notify(PluginEvent::InvocationSuccess, |p| {
            p.on_invocation_success(ctx)
        });
    }

    pub fn on_invocation_exception(&self, ctx: Option<&InvocationContext>, cause: &anyhow::Error) {
        self.notify(PluginEvent::InvocationException, |p| {
            p.on_invocation_exception(ctx, cause)
        });
    }

    pub fn invocation_finally(&self, ctx: Option<&InvocationContext>) {
        self.notify(PluginEvent::InvocationFinally, |p| p.invocation_finally(ctx));
    }

    fn notify(&self, event: PluginEvent, f: impl Fn(&dyn Plugin)) {
        // Snapshot so a plugin may (un)register others without deadlocking.
        let plugins: Vec<Arc<dyn Plugin>> = self
            .plugins
            .read()
            .expect("plugin registry poisoned")
            .iter()
            .map(|p| Arc::clone(&p.plugin))
            .collect();

        for plugin in plugins {
            let t = Instant::now();
            f(plugin.as_ref());
            debug!(
                plugin = %plugin.name(),
                event = event.as_str(),
                duration_us = t.elapsed().as_micros() as u64,
                "plugin notified"
            );
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
