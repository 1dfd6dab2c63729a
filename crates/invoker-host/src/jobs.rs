//! Jobs and plugins the host registers on its own.

use std::sync::Weak;

use async_trait::async_trait;
use invoker_core::{EngineConfig, InvocationContext};
use invoker_dispatch::{Dispatcher, Execution};
use invoker_jobs::{Job, JobCatalog, JobScheduler};
use invoker_plugins::Plugin;
use tracing::{debug, info};

pub fn register(
    catalog: &mut JobCatalog,
    config: &EngineConfig,
    scheduler: Weak<JobScheduler>,
    invocations: Dispatcher,
) {
    let report_scheduler = scheduler.clone();
    let report_pool = invocations.clone();
    catalog
        .every("status-report", config.jobs.report.clone(), move || {
            Ok(StatusReport {
                scheduler: report_scheduler.clone(),
                invocations: report_pool.clone(),
            })
        })
        .on_stop("final-status-report", move || {
            Ok(StatusReport {
                scheduler: scheduler.clone(),
                invocations: invocations.clone(),
            })
        });
}

/// Logs the status of both pools.
struct StatusReport {
    scheduler: Weak<JobScheduler>,
    invocations: Dispatcher,
}

#[async_trait]
impl Job for StatusReport {
    async fn run(&mut self, _ctx: &InvocationContext) -> anyhow::Result<Execution> {
        let Some(scheduler) = self.scheduler.upgrade() else {
            return Ok(Execution::Done);
        };
        info!("status report\n{}\n{}", self.invocations.status(), scheduler.status());
        Ok(Execution::Done)
    }
}

/// Traces every invocation outcome at debug level.
pub struct InvocationLog;

impl Plugin for InvocationLog {
    fn name(&self) -> &str {
        "invocation-log"
    }

    fn on_invocation_success(&self, ctx: &InvocationContext) {
        debug!(invocation_type = ctx.invocation_type(), "invocation succeeded");
    }

    fn on_invocation_exception(&self, ctx: Option<&InvocationContext>, cause: &anyhow::Error) {
        debug!(
            invocation_type = ctx.map(InvocationContext::invocation_type).unwrap_or("-"),
            error = %cause,
            "invocation failed"
        );
    }
}
