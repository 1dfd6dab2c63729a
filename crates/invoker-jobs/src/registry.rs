use std::sync::{Arc, Mutex, RwLock};

use crate::types::{JobSnapshot, JobState, Policy};

/// A job instantiated by the scheduler, with its live state.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub name: String,
    pub policy: Policy,
    state: Arc<Mutex<JobState>>,
}

impl ScheduledJob {
    pub(crate) fn new(name: impl Into<String>, policy: Policy) -> Self {
        Self {
            name: name.into(),
            policy,
            state: Arc::default(),
        }
    }

    pub(crate) fn shared_state(&self) -> Arc<Mutex<JobState>> {
        Arc::clone(&self.state)
    }

    pub fn state(&self) -> JobState {
        self.state.lock().expect("job state poisoned").clone()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            name: self.name.clone(),
            policy: self.policy.clone(),
            state: self.state(),
        }
    }
}

/// Jobs instantiated so far, in the order they were scheduled.
///
/// Written only by the start-up and stop passes; everything else reads.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<Vec<ScheduledJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, job: ScheduledJob) {
        self.jobs.write().expect("job registry poisoned").push(job);
    }

    pub fn len(&self) -> usize {
        self.jobs.read().expect("job registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, name: &str) -> Option<ScheduledJob> {
        self.jobs
            .read()
            .expect("job registry poisoned")
            .iter()
            .find(|job| job.name == name)
            .cloned()
    }

    pub fn jobs(&self) -> Vec<ScheduledJob> {
        self.jobs.read().expect("job registry poisoned").clone()
    }

    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        self.jobs
            .read()
            .expect("job registry poisoned")
            .iter()
            .map(ScheduledJob::snapshot)
            .collect()
    }
}
