use invoker_core::InvocationError;
use invoker_dispatch::DispatchError;
use thiserror::Error;

/// Errors that can occur within the job scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The cron expression could not be parsed.
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    /// The interval value is not a positive period such as `30s` or `1h30mn`.
    #[error("Invalid interval '{value}': {reason}")]
    InvalidInterval { value: String, reason: String },

    /// A `cron.<name>` reference with no entry in the `[cron]` table.
    #[error("Unknown schedule reference: {0}")]
    UnknownReference(String),

    /// A synchronous start-up job failed; start-up is aborted.
    #[error("Startup job '{job}' failed: {source}")]
    StartupJobFailed {
        job: String,
        #[source]
        source: InvocationError,
    },

    /// A stop job failed; the shutdown pass is aborted.
    #[error("Stop job '{job}' failed: {source}")]
    StopJobFailed {
        job: String,
        #[source]
        source: InvocationError,
    },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
