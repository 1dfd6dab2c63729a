use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use invoker_core::{DomainError, InvocationContext, Marker, Mode, StaticRuntime};
use invoker_dispatch::{Environment, Execution};
use invoker_plugins::PluginRegistry;

use crate::job::Job;

pub(crate) fn env() -> Environment {
    Environment::new(
        Arc::new(StaticRuntime::started(Mode::Prod)),
        Arc::new(PluginRegistry::new()),
    )
}

/// Start and end instants of every run of a [`Scripted`] job.
#[derive(Default)]
pub(crate) struct RunLog {
    starts: Mutex<Vec<Instant>>,
    ends: Mutex<Vec<Instant>>,
}

impl RunLog {
    pub(crate) fn count(&self) -> usize {
        self.ends.lock().expect("run log poisoned").len()
    }

    pub(crate) fn starts(&self) -> Vec<Instant> {
        self.starts.lock().expect("run log poisoned").clone()
    }

    pub(crate) fn ends(&self) -> Vec<Instant> {
        self.ends.lock().expect("run log poisoned").clone()
    }
}

/// A job that fails its first `fail_first` runs and optionally takes `hold`.
pub(crate) struct Scripted {
    log: Arc<RunLog>,
    fail_first: Arc<AtomicUsize>,
    hold: Duration,
    markers: Vec<Marker>,
}

impl Scripted {
    pub(crate) fn ok() -> (Self, Arc<RunLog>) {
        Self::failing_first(0)
    }

    pub(crate) fn failing_first(n: usize) -> (Self, Arc<RunLog>) {
        let log = Arc::new(RunLog::default());
        let job = Self {
            log: Arc::clone(&log),
            fail_first: Arc::new(AtomicUsize::new(n)),
            hold: Duration::ZERO,
            markers: Vec::new(),
        };
        (job, log)
    }

    pub(crate) fn holding(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    pub(crate) fn with_marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    /// A factory handing out jobs that share this one's log and failure budget.
    pub(crate) fn factory(&self) -> impl Fn() -> anyhow::Result<Scripted> + Send + Sync + 'static {
        let log = Arc::clone(&self.log);
        let fail_first = Arc::clone(&self.fail_first);
        let hold = self.hold;
        move || {
            Ok(Scripted {
                log: Arc::clone(&log),
                fail_first: Arc::clone(&fail_first),
                hold,
                markers: Vec::new(),
            })
        }
    }
}

#[async_trait]
impl Job for Scripted {
    async fn run(&mut self, _ctx: &InvocationContext) -> anyhow::Result<Execution> {
        self.log.starts.lock().expect("run log poisoned").push(Instant::now());
        if !self.hold.is_zero() {
            tokio::time::sleep(self.hold).await;
        }
        let failing = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        self.log.ends.lock().expect("run log poisoned").push(Instant::now());
        if failing {
            return Err(DomainError::new("Job failed", "flaky run").into());
        }
        Ok(Execution::Done)
    }

    fn markers(&self) -> Vec<Marker> {
        self.markers.clone()
    }
}

/// Poll `check` every 10 ms until it holds or `within` elapses.
pub(crate) async fn eventually(within: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
