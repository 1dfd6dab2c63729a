//! The `Job` contract and the invocation that runs a job on the jobs pool.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, Utc};
use invoker_core::{InvocationContext, InvocationError, Marker};
use invoker_dispatch::{Environment, Execution, Invocation};
use tracing::{error, warn};

use crate::expression::CronExpression;
use crate::types::JobState;

/// A background job. `run` may suspend like any invocation; the next attempt
/// calls `run` again from the start.
#[async_trait]
pub trait Job: Send + 'static {
    async fn run(&mut self, ctx: &InvocationContext) -> anyhow::Result<Execution>;

    /// Markers exposed to plugins through the invocation context.
    fn markers(&self) -> Vec<Marker> {
        Vec::new()
    }
}

/// What happens after a finished run.
pub(crate) enum Recurrence {
    Once,
    FixedDelay(Duration),
    Cron(CronExpression),
}

/// Runs a [`Job`] and records its outcome in the shared [`JobState`].
pub struct JobInvocation {
    name: String,
    job: Box<dyn Job>,
    state: Arc<Mutex<JobState>>,
    recurrence: Recurrence,
}

impl JobInvocation {
    /// A one-off run that records into its own state.
    pub fn once(name: impl Into<String>, job: Box<dyn Job>) -> Self {
        Self::new(name, job, Arc::default(), Recurrence::Once)
    }

    pub(crate) fn new(
        name: impl Into<String>,
        job: Box<dyn Job>,
        state: Arc<Mutex<JobState>>,
        recurrence: Recurrence,
    ) -> Self {
        Self {
            name: name.into(),
            job,
            state,
            recurrence,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> JobState {
        self.lock_state().clone()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, JobState> {
        self.state.lock().expect("job state poisoned")
    }

    /// Plan the next cron instant on the host clock and return the delay until
    /// it. `None` when the job is not a cron job or the expression never
    /// matches again.
    pub(crate) fn plan_cron(&self) -> Option<Duration> {
        let Recurrence::Cron(expression) = &self.recurrence else {
            return None;
        };
        let now = Local::now();
        let mut state = self.state.lock().expect("job state poisoned");
        let previous = state.next_planned.map(|planned| planned.with_timezone(&Local));
        let Some(next) = expression.plan_next(now, previous) else {
            warn!(
                job = %self.name,
                expression = %expression,
                "cron expression has no match in the future, job will never be executed"
            );
            state.next_planned = None;
            return None;
        };
        let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
        state.next_planned = Some(next.with_timezone(&Utc));
        Some(delay)
    }

    fn record_error(&self, err: &InvocationError) {
        let mut state = self.lock_state();
        state.was_error = true;
        state.last_error = Some(err.to_string());
    }
}

#[async_trait]
impl Invocation for JobInvocation {
    fn invocation_type(&self) -> &str {
        "Job"
    }

    fn label(&self) -> String {
        self.name.clone()
    }

    fn context(&self) -> InvocationContext {
        InvocationContext::new(self.invocation_type()).with_markers(self.job.markers())
    }

    async fn execute(&mut self, ctx: &InvocationContext) -> anyhow::Result<Execution> {
        {
            let mut state = self.lock_state();
            state.last_run = Some(Utc::now());
            state.was_error = false;
            state.last_error = None;
            state.run_count += 1;
        }
        self.job.run(ctx).await
    }

    fn on_exception(
        &mut self,
        env: &Environment,
        ctx: Option<&InvocationContext>,
        cause: anyhow::Error,
    ) -> InvocationError {
        env.plugins().on_invocation_exception(ctx, &cause);
        let err = InvocationError::from_cause(cause);
        error!(job = %self.name, code = err.code(), error = %err, "Error during job execution");
        self.record_error(&err);
        err
    }

    fn reschedule(&mut self) -> Option<Duration> {
        match self.recurrence {
            Recurrence::Once => None,
            Recurrence::FixedDelay(every) => Some(every),
            Recurrence::Cron(_) => self.plan_cron(),
        }
    }
}
