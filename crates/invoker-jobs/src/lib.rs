//! `invoker-jobs` — background jobs on a dedicated dispatcher.
//!
//! # Overview
//!
//! Jobs are registered in a [`JobCatalog`] together with exactly one
//! [`Policy`]. [`JobScheduler::start`] walks the catalog in registration
//! order, instantiates each job and arms it on the jobs pool;
//! [`JobScheduler::stop`] runs the stop jobs and shuts the pool down.
//!
//! # Policies
//!
//! | Policy                         | Behaviour                                         |
//! |--------------------------------|---------------------------------------------------|
//! | `Startup { run_async: false }` | Run inline during start; a failure aborts start   |
//! | `Startup { run_async: true }`  | Submitted to the jobs pool during start           |
//! | `Interval { every }`           | First run after `every`, then `every` after each  |
//! | `Cron { expression }`          | Next matching instant, re-armed after every run   |
//! | `Stop`                         | Run inline during stop; a failure aborts stop     |
//!
//! Schedule values starting with `cron.` are looked up in the `[cron]` table
//! of the engine configuration; `never` disables the job.

pub mod catalog;
pub mod error;
pub mod expression;
pub mod job;
pub mod period;
pub mod registry;
pub mod scheduler;
mod status;
pub mod types;

#[cfg(test)]
mod test_support;

pub use catalog::{JobCatalog, JobDescriptor};
pub use error::{Result, SchedulerError};
pub use expression::CronExpression;
pub use job::{Job, JobInvocation};
pub use registry::{JobRegistry, ScheduledJob};
pub use scheduler::JobScheduler;
pub use types::{JobSnapshot, JobState, Policy, SchedulerSnapshot};
