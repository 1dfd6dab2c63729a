use std::sync::Arc;

use invoker_core::{InvocationError, Runtime};
use invoker_plugins::PluginRegistry;

/// Collaborators every hook may consult: the runtime and the plugin registry.
///
/// Cheap to clone; both dispatchers of a process share the same instance.
#[derive(Clone)]
pub struct Environment {
    runtime: Arc<dyn Runtime>,
    plugins: Arc<PluginRegistry>,
}

impl Environment {
    pub fn new(runtime: Arc<dyn Runtime>, plugins: Arc<PluginRegistry>) -> Self {
        Self { runtime, plugins }
    }

    pub fn runtime(&self) -> &dyn Runtime {
        self.runtime.as_ref()
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Idempotent environment setup run by the default `init` hook.
    ///
    /// Dev mode applies code changes and starts the runtime lazily; prod mode
    /// refuses to run anything before the runtime is up.
    pub fn ensure_started(&self) -> anyhow::Result<()> {
        let runtime = self.runtime();
        let dev = runtime.mode().is_dev();
        if dev {
            runtime.detect_changes()?;
        }
        if !runtime.is_started() {
            if !dev {
                return Err(InvocationError::unexpected("Application is not started").into());
            }
            runtime.start()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("mode", &self.runtime.mode())
            .field("started", &self.runtime.is_started())
            .field("plugins", &self.plugins.len())
            .finish()
    }
}
