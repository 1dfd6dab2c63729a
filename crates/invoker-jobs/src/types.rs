use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// When a job runs. Attached to the job at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Policy {
    /// Run once while the scheduler starts.
    Startup { run_async: bool },

    /// Run repeatedly, `every` after the end of the previous run. Accepts a
    /// period (`30s`, `1h30mn`), a `cron.<name>` reference or `never`.
    Interval { every: String },

    /// Run at every instant matching a cron expression (or a `cron.<name>`
    /// reference, or `never`).
    Cron { expression: String },

    /// Run once while the scheduler stops.
    Stop,
}

impl Policy {
    pub fn is_stop(&self) -> bool {
        matches!(self, Policy::Stop)
    }
}

/// Runtime bookkeeping for one scheduled job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    /// Start of the most recent run.
    pub last_run: Option<DateTime<Utc>>,
    /// Whether the most recent run failed.
    pub was_error: bool,
    pub last_error: Option<String>,
    /// Next instant planned for a cron job.
    pub next_planned: Option<DateTime<Utc>>,
    pub run_count: u64,
}

/// Serializable view of a scheduled job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub name: String,
    pub policy: Policy,
    #[serde(flatten)]
    pub state: JobState,
}

/// Serializable view of the whole scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub pool_size: usize,
    pub active: usize,
    pub queued: usize,
    pub submitted: u64,
    pub shut_down: bool,
    pub jobs: Vec<JobSnapshot>,
}
