//! Recording collaborators shared by the dispatch tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use invoker_core::{DomainError, InvocationContext, Marker, Mode, Runtime};
use invoker_plugins::{Plugin, PluginEntry, PluginRegistry};

use crate::env::Environment;
use crate::error::DispatchError;
use crate::invocation::{Execution, Invocation};
use crate::suspend::Suspend;

/// Ordered log of hook and collaborator calls.
#[derive(Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub(crate) fn push(&self, event: impl Into<String>) {
        self.0.lock().expect("journal poisoned").push(event.into());
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.0.lock().expect("journal poisoned").clone()
    }

    pub(crate) fn count(&self, event: &str) -> usize {
        self.0
            .lock()
            .expect("journal poisoned")
            .iter()
            .filter(|e| e.as_str() == event)
            .count()
    }
}

struct RecordingRuntime {
    mode: Mode,
    started: AtomicBool,
    journal: Journal,
}

impl Runtime for RecordingRuntime {
    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn start(&self) -> anyhow::Result<()> {
        self.journal.push("start");
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn detect_changes(&self) -> anyhow::Result<()> {
        self.journal.push("detect_changes");
        Ok(())
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn clear_request_state(&self) {
        self.journal.push("clear");
    }
}

struct RecordingPlugin {
    journal: Journal,
}

impl Plugin for RecordingPlugin {
    fn name(&self) -> &str {
        "recording"
    }

    fn before_invocation(&self, ctx: &InvocationContext) {
        self.journal.push("before");
        if !ctx.markers().is_empty() {
            let markers: Vec<&str> = ctx.markers().iter().map(Marker::as_str).collect();
            self.journal.push(format!("before[{}]", markers.join(",")));
        }
    }

    fn after_invocation(&self, _ctx: &InvocationContext) {
        self.journal.push("after");
    }

    fn on_invocation_success(&self, _ctx: &InvocationContext) {
        self.journal.push("success");
    }

    fn on_invocation_exception(&self, ctx: Option<&InvocationContext>, _cause: &anyhow::Error) {
        self.journal
            .push(if ctx.is_some() { "exception" } else { "exception(none)" });
    }

    fn invocation_finally(&self, ctx: Option<&InvocationContext>) {
        self.journal
            .push(if ctx.is_some() { "finally" } else { "finally(none)" });
    }
}

/// An environment whose runtime and plugin both write to the returned journal.
pub(crate) fn env_with(mode: Mode, started: bool) -> (Environment, Journal) {
    let journal = Journal::default();
    let runtime = RecordingRuntime {
        mode,
        started: AtomicBool::new(started),
        journal: journal.clone(),
    };
    let plugins = PluginRegistry::new();
    plugins.register(PluginEntry::new(Arc::new(RecordingPlugin {
        journal: journal.clone(),
    })));
    (
        Environment::new(Arc::new(runtime), Arc::new(plugins)),
        journal,
    )
}

/// What one `execute` call of a [`Probe`] does.
pub(crate) enum Act {
    Done,
    Suspend(Suspend),
    Domain(&'static str),
    Fail(&'static str),
    Panic,
    /// Sleep, then finish.
    Hold(Duration),
    /// Sleep, then suspend.
    HoldThenSuspend(Duration, Suspend),
}

/// A scripted invocation. Each attempt consumes the next [`Act`]; an empty
/// script finishes immediately.
pub(crate) struct Probe {
    journal: Journal,
    script: VecDeque<Act>,
    abort: bool,
    fail_after: bool,
    panic_after: bool,
    markers: Vec<Marker>,
    every: Option<Duration>,
    remaining_runs: usize,
    pub(crate) rejected: Arc<AtomicUsize>,
}

impl Probe {
    pub(crate) fn new(journal: &Journal, script: impl IntoIterator<Item = Act>) -> Self {
        Self {
            journal: journal.clone(),
            script: script.into_iter().collect(),
            abort: false,
            fail_after: false,
            panic_after: false,
            markers: Vec::new(),
            every: None,
            remaining_runs: 0,
            rejected: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn aborting(mut self) -> Self {
        self.abort = true;
        self
    }

    pub(crate) fn failing_after(mut self) -> Self {
        self.fail_after = true;
        self
    }

    pub(crate) fn panicking_after(mut self) -> Self {
        self.panic_after = true;
        self
    }

    pub(crate) fn transactional(mut self) -> Self {
        self.markers.push(Marker::TRANSACTIONAL);
        self
    }

    /// Ask for `runs` extra runs, `every` apart.
    pub(crate) fn repeating(mut self, every: Duration, runs: usize) -> Self {
        self.every = Some(every);
        self.remaining_runs = runs;
        self
    }
}

#[async_trait]
impl Invocation for Probe {
    fn invocation_type(&self) -> &str {
        "Probe"
    }

    fn context(&self) -> InvocationContext {
        InvocationContext::new(self.invocation_type()).with_markers(self.markers.clone())
    }

    fn init(&mut self, env: &Environment) -> anyhow::Result<bool> {
        env.ensure_started()?;
        Ok(!self.abort)
    }

    async fn execute(&mut self, _ctx: &InvocationContext) -> anyhow::Result<Execution> {
        self.journal.push("execute");
        match self.script.pop_front().unwrap_or(Act::Done) {
            Act::Done => Ok(Execution::Done),
            Act::Suspend(suspend) => Ok(Execution::Suspend(suspend)),
            Act::Domain(description) => Err(DomainError::new("Probe failed", description).into()),
            Act::Fail(msg) => Err(anyhow::anyhow!(msg)),
            Act::Panic => panic!("probe exploded"),
            Act::Hold(duration) => {
                tokio::time::sleep(duration).await;
                Ok(Execution::Done)
            }
            Act::HoldThenSuspend(duration, suspend) => {
                tokio::time::sleep(duration).await;
                Ok(Execution::Suspend(suspend))
            }
        }
    }

    fn after(&mut self, env: &Environment, ctx: &InvocationContext) -> anyhow::Result<()> {
        env.plugins().after_invocation(ctx);
        if self.fail_after {
            anyhow::bail!("after hook broke");
        }
        if self.panic_after {
            panic!("after hook exploded");
        }
        Ok(())
    }

    fn on_rejected(&mut self, _reason: &DispatchError) {
        self.rejected.fetch_add(1, Ordering::SeqCst);
        self.journal.push("rejected");
    }

    fn reschedule(&mut self) -> Option<Duration> {
        if self.remaining_runs == 0 {
            return None;
        }
        self.remaining_runs -= 1;
        self.every
    }
}

/// Poll `check` every 10 ms until it holds or `within` elapses.
pub(crate) async fn eventually(within: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
