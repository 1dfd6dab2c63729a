//! `JobScheduler` — arms catalog jobs on a dedicated dispatcher.

use std::time::Duration;

use invoker_core::EngineConfig;
use invoker_dispatch::{Dispatcher, Environment, InvocationHandle};
use tracing::{debug, error, info, warn};

use crate::catalog::{JobCatalog, JobDescriptor};
use crate::error::{Result, SchedulerError};
use crate::expression::CronExpression;
use crate::job::{Job, JobInvocation, Recurrence};
use crate::period::{is_disabled, parse_period};
use crate::registry::{JobRegistry, ScheduledJob};
use crate::status;
use crate::types::{Policy, SchedulerSnapshot};

/// Name of the jobs pool in logs and status output.
pub const JOBS_POOL: &str = "jobs";

pub struct JobScheduler {
    config: EngineConfig,
    dispatcher: Dispatcher,
    registry: JobRegistry,
}

impl JobScheduler {
    /// Create the scheduler and its `jobs.pool`-sized dispatcher. Must be
    /// called from within a tokio runtime.
    pub fn new(config: &EngineConfig, env: Environment) -> Self {
        Self {
            dispatcher: Dispatcher::new(JOBS_POOL, config.jobs_pool_size(), env),
            config: config.clone(),
            registry: JobRegistry::new(),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Start-up pass over `catalog`, in registration order.
    ///
    /// A failing synchronous start-up job aborts the pass with its cause.
    /// Any other per-job problem (instantiation, bad schedule, rejection) is
    /// logged and only that job is affected.
    pub async fn start(&self, catalog: &JobCatalog) -> Result<()> {
        info!(jobs = catalog.len(), pool_size = self.dispatcher.pool_size(), "job scheduler starting");
        for descriptor in catalog.descriptors() {
            match &descriptor.policy {
                Policy::Stop => continue,
                Policy::Startup { run_async: false } => self.run_startup(descriptor).await?,
                Policy::Startup { run_async: true } => self.submit_startup(descriptor),
                Policy::Interval { every } => self.schedule_interval(descriptor, every),
                Policy::Cron { expression } => self.schedule_cron(descriptor, expression),
            }
        }
        info!(scheduled = self.registry.len(), "job scheduler started");
        Ok(())
    }

    /// Run the stop jobs inline, in registration order, then shut the jobs
    /// pool down. The pool is shut down even when a stop job fails.
    pub async fn stop(&self, catalog: &JobCatalog) -> Result<()> {
        let result = self.run_stop_jobs(catalog).await;
        self.dispatcher.shutdown();
        info!("job scheduler stopped");
        result
    }

    /// Run `job` once on the jobs pool right away.
    pub fn now<J: Job>(&self, name: impl Into<String>, job: J) -> Result<InvocationHandle> {
        let invocation = JobInvocation::once(name, Box::new(job));
        Ok(self.dispatcher.submit(invocation)?)
    }

    /// Run `job` once on the jobs pool after `delay`.
    pub fn run_in<J: Job>(
        &self,
        name: impl Into<String>,
        job: J,
        delay: Duration,
    ) -> Result<InvocationHandle> {
        let invocation = JobInvocation::once(name, Box::new(job));
        Ok(self.dispatcher.submit_after(invocation, delay)?)
    }

    pub fn status(&self) -> String {
        status::render(
            &self.config,
            &self.dispatcher.stats(),
            self.dispatcher.is_shut_down(),
            &self.registry.snapshot(),
            &self.dispatcher.delayed(),
        )
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let stats = self.dispatcher.stats();
        SchedulerSnapshot {
            pool_size: stats.pool_size,
            active: stats.active,
            queued: stats.delayed + stats.waiting,
            submitted: stats.submitted,
            shut_down: self.dispatcher.is_shut_down(),
            jobs: self.registry.snapshot(),
        }
    }

    // --- private helpers ---------------------------------------------------

    /// Instantiate a job and record it in the registry.
    fn instantiate(&self, descriptor: &JobDescriptor) -> Option<(Box<dyn Job>, ScheduledJob)> {
        match descriptor.instantiate() {
            Ok(job) => {
                let scheduled = ScheduledJob::new(&descriptor.name, descriptor.policy.clone());
                self.registry.push(scheduled.clone());
                Some((job, scheduled))
            }
            Err(e) => {
                error!(job = %descriptor.name, error = %e, "Cannot instantiate job");
                None
            }
        }
    }

    async fn run_startup(&self, descriptor: &JobDescriptor) -> Result<()> {
        let Some((job, scheduled)) = self.instantiate(descriptor) else {
            return Ok(());
        };
        debug!(job = %descriptor.name, "running start-up job");
        let mut invocation =
            JobInvocation::new(&descriptor.name, job, scheduled.shared_state(), Recurrence::Once);
        self.dispatcher
            .run_inline(&mut invocation)
            .await
            .map_err(|source| SchedulerError::StartupJobFailed {
                job: descriptor.name.clone(),
                source,
            })
    }

    fn submit_startup(&self, descriptor: &JobDescriptor) {
        let Some((job, scheduled)) = self.instantiate(descriptor) else {
            return;
        };
        let invocation =
            JobInvocation::new(&descriptor.name, job, scheduled.shared_state(), Recurrence::Once);
        // Queued like a delayed task so a full pool delays it instead of dropping it.
        match self.dispatcher.submit_after(invocation, Duration::ZERO) {
            Ok(_) => debug!(job = %descriptor.name, "start-up job submitted"),
            Err(e) => self.misconfigured(&scheduled, e.into()),
        }
    }

    fn schedule_interval(&self, descriptor: &JobDescriptor, every: &str) {
        let Some((job, scheduled)) = self.instantiate(descriptor) else {
            return;
        };
        let period = match self.resolve(descriptor, every) {
            Ok(Some(value)) => parse_period(&value),
            Ok(None) => return,
            Err(e) => Err(e),
        };
        let period = match period {
            Ok(period) => period,
            Err(e) => return self.misconfigured(&scheduled, e),
        };

        let invocation = JobInvocation::new(
            &descriptor.name,
            job,
            scheduled.shared_state(),
            Recurrence::FixedDelay(period),
        );
        match self.dispatcher.submit_after(invocation, period) {
            Ok(_) => info!(job = %descriptor.name, every_secs = period.as_secs(), "interval job scheduled"),
            Err(e) => error!(job = %descriptor.name, error = %e, "interval job not scheduled"),
        }
    }

    fn schedule_cron(&self, descriptor: &JobDescriptor, expression: &str) {
        let Some((job, scheduled)) = self.instantiate(descriptor) else {
            return;
        };
        let expression = match self.resolve(descriptor, expression) {
            Ok(Some(value)) => CronExpression::parse(&value),
            Ok(None) => return,
            Err(e) => Err(e),
        };
        let expression = match expression {
            Ok(expression) => expression,
            Err(e) => return self.misconfigured(&scheduled, e),
        };

        let invocation = JobInvocation::new(
            &descriptor.name,
            job,
            scheduled.shared_state(),
            Recurrence::Cron(expression),
        );
        let Some(delay) = invocation.plan_cron() else {
            return;
        };
        match self.dispatcher.submit_after(invocation, delay) {
            Ok(_) => info!(
                job = %descriptor.name,
                next = ?scheduled.state().next_planned,
                "cron job scheduled"
            ),
            Err(e) => error!(job = %descriptor.name, error = %e, "cron job not scheduled"),
        }
    }

    /// Follow `cron.<name>` references. `Ok(None)` means the job is disabled.
    fn resolve(&self, descriptor: &JobDescriptor, value: &str) -> Result<Option<String>> {
        let resolved = self
            .config
            .resolve_schedule(value)
            .ok_or_else(|| SchedulerError::UnknownReference(value.to_string()))?;
        if is_disabled(&resolved) {
            info!(job = %descriptor.name, "Skipping job, schedule is not defined");
            return Ok(None);
        }
        Ok(Some(resolved))
    }

    fn misconfigured(&self, scheduled: &ScheduledJob, err: SchedulerError) {
        error!(job = %scheduled.name, error = %err, "job not scheduled");
        let state = scheduled.shared_state();
        let mut state = state.lock().expect("job state poisoned");
        state.was_error = true;
        state.last_error = Some(err.to_string());
    }

    async fn run_stop_jobs(&self, catalog: &JobCatalog) -> Result<()> {
        for descriptor in catalog.descriptors().iter().filter(|d| d.policy.is_stop()) {
            let Some((job, scheduled)) = self.instantiate(descriptor) else {
                continue;
            };
            debug!(job = %descriptor.name, "running stop job");
            let mut invocation =
                JobInvocation::new(&descriptor.name, job, scheduled.shared_state(), Recurrence::Once);
            if let Err(source) = self.dispatcher.run_inline(&mut invocation).await {
                warn!(job = %descriptor.name, error = %source, "stop job failed, aborting stop pass");
                return Err(SchedulerError::StopJobFailed {
                    job: descriptor.name.clone(),
                    source,
                });
            }
        }
        Ok(())
    }
}
