use std::time::Duration;

use async_trait::async_trait;
use invoker_core::{InvocationContext, InvocationError};

use crate::env::Environment;
use crate::error::DispatchError;
use crate::suspend::{Dependency, Suspend};

/// What `execute` asks the engine to do next.
#[derive(Debug)]
pub enum Execution {
    /// The work is finished.
    Done,
    /// Release the slot and run the whole invocation again later.
    Suspend(Suspend),
}

impl Execution {
    pub fn retry_in(delay: Duration) -> Self {
        Execution::Suspend(Suspend::Timeout(delay))
    }

    pub fn wait_for(dependency: Dependency) -> Self {
        Execution::Suspend(Suspend::Wait(dependency))
    }
}

/// A runnable unit of work with an ordered life-cycle.
///
/// The engine calls, per attempt:
///
/// ```text
/// pre_init → init ─false─────────────────────────────┐
///              │ ok                                   │
///            before → execute ─Done──→ after → on_success
///                        │ Suspend → after            │
///                        └ Err ────→ on_exception     │
///                                         finally ←───┘  (always, once)
/// ```
///
/// Every hook except `execute` has a default that notifies the plugins held
/// by the [`Environment`]. Overrides that still want those notifications must
/// send them themselves.
///
/// State is not kept across a suspension: the next attempt starts again at
/// `pre_init`, so work done before the suspend point has to be idempotent.
#[async_trait]
pub trait Invocation: Send + 'static {
    /// Tag exposed to collaborators through the context.
    fn invocation_type(&self) -> &str;

    /// Label used in logs and in the delayed-task listing.
    fn label(&self) -> String {
        self.invocation_type().to_string()
    }

    /// The context handed to every hook after a successful `init`.
    fn context(&self) -> InvocationContext {
        InvocationContext::new(self.invocation_type())
    }

    fn pre_init(&mut self, env: &Environment) {
        env.runtime().clear_request_state();
    }

    /// Return `Ok(false)` to skip the attempt silently.
    fn init(&mut self, env: &Environment) -> anyhow::Result<bool> {
        env.ensure_started()?;
        Ok(true)
    }

    fn before(&mut self, env: &Environment, ctx: &InvocationContext) -> anyhow::Result<()> {
        env.plugins().before_invocation(ctx);
        Ok(())
    }

    async fn execute(&mut self, ctx: &InvocationContext) -> anyhow::Result<Execution>;

    fn after(&mut self, env: &Environment, ctx: &InvocationContext) -> anyhow::Result<()> {
        env.plugins().after_invocation(ctx);
        Ok(())
    }

    fn on_success(&mut self, env: &Environment, ctx: &InvocationContext) -> anyhow::Result<()> {
        env.plugins().on_invocation_success(ctx);
        Ok(())
    }

    fn on_exception(
        &mut self,
        env: &Environment,
        ctx: Option<&InvocationContext>,
        cause: anyhow::Error,
    ) -> InvocationError {
        env.plugins().on_invocation_exception(ctx, &cause);
        InvocationError::from_cause(cause)
    }

    fn finally(&mut self, env: &Environment, ctx: Option<&InvocationContext>) {
        env.plugins().invocation_finally(ctx);
    }

    /// Called by [`crate::Dispatcher::submit_or_cancel`] when the pool refused
    /// the invocation; it is dropped right after.
    fn on_rejected(&mut self, _reason: &DispatchError) {}

    /// Asked once after every finished (not suspended) attempt. `Some(delay)`
    /// resubmits the same instance through the delayed path.
    fn reschedule(&mut self) -> Option<Duration> {
        None
    }
}
