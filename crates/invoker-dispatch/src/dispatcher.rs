//! `Dispatcher` — a bounded pool of invocation slots on the tokio runtime.
//!
//! Fresh submissions never queue: when every slot is busy [`Dispatcher::submit`]
//! fails immediately. Work coming back from a suspension, a delay or a
//! recurrence always waits for a slot instead.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use invoker_core::{InvocationError, InvocationId};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::env::Environment;
use crate::error::{DispatchError, Result};
use crate::invocation::Invocation;
use crate::lifecycle::{self, Step};
use crate::suspend::{Dependency, PendingResult, Suspend};
use crate::watcher::CompletionWatcher;

/// How the first finished attempt of a submission ended.
#[derive(Debug)]
pub enum Attempt {
    Completed,
    /// `init` declined to run.
    Aborted,
    Failed(InvocationError),
    /// The dispatcher shut down while the invocation was delayed or suspended.
    Cancelled,
}

impl Attempt {
    pub fn is_completed(&self) -> bool {
        matches!(self, Attempt::Completed)
    }
}

/// Returned by every accepted submission. Follows the invocation across its
/// suspensions and resolves once an attempt finishes.
pub struct InvocationHandle {
    id: InvocationId,
    finished: Arc<AtomicBool>,
    outcome: oneshot::Receiver<Attempt>,
}

impl InvocationHandle {
    pub fn id(&self) -> &InvocationId {
        &self.id
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub async fn join(self) -> Attempt {
        self.outcome.await.unwrap_or_else(|_| {
            Attempt::Failed(InvocationError::unexpected(
                "invocation dropped before reporting an outcome",
            ))
        })
    }
}

impl PendingResult for InvocationHandle {
    fn is_done(&self) -> bool {
        self.is_finished()
    }
}

impl std::fmt::Debug for InvocationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationHandle")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

struct Reporter {
    finished: Arc<AtomicBool>,
    tx: oneshot::Sender<Attempt>,
}

impl Reporter {
    fn report(self, attempt: Attempt) {
        let _ = self.tx.send(attempt);
        self.finished.store(true, Ordering::Release);
    }
}

/// An invocation in flight between slots.
pub(crate) struct Queued {
    id: InvocationId,
    label: String,
    invocation: Box<dyn Invocation>,
    /// Reset every time the invocation starts waiting for a slot.
    queued_at: Instant,
    reporter: Option<Reporter>,
}

impl Queued {
    fn new(invocation: Box<dyn Invocation>) -> (Self, InvocationHandle) {
        let id = InvocationId::new();
        let finished = Arc::new(AtomicBool::new(false));
        let (tx, outcome) = oneshot::channel();
        let queued = Self {
            id: id.clone(),
            label: invocation.label(),
            invocation,
            queued_at: Instant::now(),
            reporter: Some(Reporter {
                finished: Arc::clone(&finished),
                tx,
            }),
        };
        (queued, InvocationHandle { id, finished, outcome })
    }

    pub(crate) fn cancel(mut self) {
        debug!(invocation = %self.id, label = %self.label, "invocation cancelled");
        if let Some(reporter) = self.reporter.take() {
            reporter.report(Attempt::Cancelled);
        }
    }
}

enum Start {
    Now(OwnedSemaphorePermit),
    /// Sleep first; `key` indexes the delayed-task table.
    After { key: u64, delay: Duration },
    Resume,
}

struct DelayedEntry {
    label: String,
    due: Instant,
}

/// A delayed invocation that has not reached its slot yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayedTask {
    pub label: String,
    pub remaining: Duration,
}

/// Point-in-time counters for one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub name: String,
    pub pool_size: usize,
    /// Slots currently running an attempt.
    pub active: usize,
    /// Invocations whose delay elapsed (or that were resumed) and that wait
    /// for a free slot.
    pub waiting: usize,
    /// Invocations still inside their delay.
    pub delayed: usize,
    /// Every accepted submission, resubmissions excluded.
    pub submitted: u64,
}

pub(crate) struct Inner {
    name: String,
    pool_size: usize,
    slots: Arc<Semaphore>,
    env: Environment,
    runtime: Handle,
    shutdown: CancellationToken,
    delayed: DashMap<u64, DelayedEntry>,
    next_delayed: AtomicU64,
    waiting: AtomicUsize,
    submitted: AtomicU64,
    watcher: OnceLock<CompletionWatcher>,
}

impl Inner {
    fn spawn(self: &Arc<Self>, queued: Queued, start: Start) {
        let inner = Arc::clone(self);
        self.runtime.spawn(inner.run(queued, start));
    }

    async fn run(self: Arc<Self>, mut queued: Queued, start: Start) {
        let permit = match start {
            Start::Now(permit) => permit,
            Start::After { key, delay } => {
                if !self.sleep_delayed(key, delay).await {
                    queued.cancel();
                    return;
                }
                queued.queued_at = Instant::now();
                match self.acquire_slot().await {
                    Some(permit) => permit,
                    None => return queued.cancel(),
                }
            }
            Start::Resume => match self.acquire_slot().await {
                Some(permit) => permit,
                None => return queued.cancel(),
            },
        };

        debug!(
            pool = %self.name,
            invocation = %queued.id,
            label = %queued.label,
            queue_wait_ms = queued.queued_at.elapsed().as_millis() as u64,
            "attempt starting"
        );
        let step = lifecycle::run_attempt(&self.env, queued.invocation.as_mut()).await;
        drop(permit);
        self.settle(queued, step);
    }

    /// Register `queued` in the delayed table, then start its sleep.
    fn delay(self: &Arc<Self>, queued: Queued, delay: Duration) {
        let key = self.next_delayed.fetch_add(1, Ordering::Relaxed);
        self.delayed.insert(
            key,
            DelayedEntry {
                label: queued.label.clone(),
                due: Instant::now() + delay,
            },
        );
        self.spawn(queued, Start::After { key, delay });
    }

    async fn sleep_delayed(&self, key: u64, delay: Duration) -> bool {
        let elapsed = tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.shutdown.cancelled() => false,
        };
        self.delayed.remove(&key);
        elapsed
    }

    async fn acquire_slot(&self) -> Option<OwnedSemaphorePermit> {
        self.waiting.fetch_add(1, Ordering::Relaxed);
        let permit = tokio::select! {
            permit = Arc::clone(&self.slots).acquire_owned() => permit.ok(),
            _ = self.shutdown.cancelled() => None,
        };
        self.waiting.fetch_sub(1, Ordering::Relaxed);
        permit
    }

    fn settle(self: &Arc<Self>, queued: Queued, step: Step) {
        match step {
            Step::Suspended(suspend) => self.park(queued, suspend),
            Step::Completed => self.finish(queued, Attempt::Completed),
            Step::Aborted => self.finish(queued, Attempt::Aborted),
            Step::Failed(err) => {
                warn!(
                    pool = %self.name,
                    invocation = %queued.id,
                    label = %queued.label,
                    code = err.code(),
                    error = %err,
                    "invocation failed"
                );
                self.finish(queued, Attempt::Failed(err));
            }
        }
    }

    fn finish(self: &Arc<Self>, mut queued: Queued, attempt: Attempt) {
        let next = queued.invocation.reschedule();
        if let Some(reporter) = queued.reporter.take() {
            reporter.report(attempt);
        }
        let Some(delay) = next else { return };
        if self.shutdown.is_cancelled() {
            debug!(label = %queued.label, "not rescheduled: pool is shut down");
            return;
        }
        debug!(
            pool = %self.name,
            label = %queued.label,
            delay_ms = delay.as_millis() as u64,
            "invocation rescheduled"
        );
        self.delay(queued, delay);
    }

    /// Hand a suspended invocation to whatever resumes it. The slot is free.
    fn park(self: &Arc<Self>, queued: Queued, suspend: Suspend) {
        debug!(
            pool = %self.name,
            invocation = %queued.id,
            label = %queued.label,
            %suspend,
            "invocation suspended"
        );
        match suspend {
            Suspend::Timeout(delay) => self.delay(queued, delay),
            Suspend::Wait(Dependency::Reporting(source)) => {
                let inner = Arc::clone(self);
                source.on_complete(Box::new(move || inner.resume(queued)));
            }
            Suspend::Wait(Dependency::Opaque(handle)) => {
                self.watcher().watch(handle, queued);
            }
        }
    }

    pub(crate) fn resume(self: &Arc<Self>, mut queued: Queued) {
        if self.shutdown.is_cancelled() {
            return queued.cancel();
        }
        queued.queued_at = Instant::now();
        self.spawn(queued, Start::Resume);
    }

    fn watcher(self: &Arc<Self>) -> &CompletionWatcher {
        self.watcher.get_or_init(|| {
            CompletionWatcher::start(
                &self.name,
                Arc::downgrade(self),
                &self.runtime,
                self.shutdown.clone(),
            )
        })
    }

    fn rejected(&self) -> DispatchError {
        DispatchError::Rejected {
            pool: self.name.clone(),
            pool_size: self.pool_size,
        }
    }

    fn shut_down(&self) -> DispatchError {
        DispatchError::ShutDown {
            pool: self.name.clone(),
        }
    }
}

/// A named pool of `pool_size` invocation slots. Clones share the pool.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Must be called from within a tokio runtime: completion callbacks fired
    /// from foreign threads spawn onto it.
    pub fn new(name: impl Into<String>, pool_size: usize, env: Environment) -> Self {
        let name = name.into();
        let pool_size = pool_size.max(1);
        info!(pool = %name, pool_size, "dispatcher created");
        Self {
            inner: Arc::new(Inner {
                name,
                pool_size,
                slots: Arc::new(Semaphore::new(pool_size)),
                env,
                runtime: Handle::current(),
                shutdown: CancellationToken::new(),
                delayed: DashMap::new(),
                next_delayed: AtomicU64::new(0),
                waiting: AtomicUsize::new(0),
                submitted: AtomicU64::new(0),
                watcher: OnceLock::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn pool_size(&self) -> usize {
        self.inner.pool_size
    }

    pub fn env(&self) -> &Environment {
        &self.inner.env
    }

    /// Start `invocation` on a free slot, or fail with
    /// [`DispatchError::Rejected`] when all slots are busy.
    pub fn submit<I: Invocation>(&self, invocation: I) -> Result<InvocationHandle> {
        self.try_submit(Box::new(invocation)).map_err(|(err, _)| err)
    }

    /// Like [`submit`](Self::submit), but a refused invocation gets its
    /// `on_rejected` hook before being dropped.
    pub fn submit_or_cancel<I: Invocation>(&self, invocation: I) -> Result<InvocationHandle> {
        self.try_submit(Box::new(invocation))
            .map_err(|(err, mut invocation)| {
                warn!(pool = %self.inner.name, label = %invocation.label(), error = %err, "invocation cancelled");
                invocation.on_rejected(&err);
                err
            })
    }

    /// Run `invocation` once `delay` has elapsed and a slot is free.
    pub fn submit_after<I: Invocation>(
        &self,
        invocation: I,
        delay: Duration,
    ) -> Result<InvocationHandle> {
        if self.inner.shutdown.is_cancelled() {
            return Err(self.inner.shut_down());
        }
        let (queued, handle) = Queued::new(Box::new(invocation));
        self.inner.submitted.fetch_add(1, Ordering::Relaxed);
        debug!(
            pool = %self.inner.name,
            invocation = %queued.id,
            label = %queued.label,
            delay_ms = delay.as_millis() as u64,
            "invocation delayed"
        );
        self.inner.delay(queued, delay);
        Ok(handle)
    }

    fn try_submit(
        &self,
        invocation: Box<dyn Invocation>,
    ) -> std::result::Result<InvocationHandle, (DispatchError, Box<dyn Invocation>)> {
        if self.inner.shutdown.is_cancelled() {
            return Err((self.inner.shut_down(), invocation));
        }
        let permit = match Arc::clone(&self.inner.slots).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => return Err((self.inner.rejected(), invocation)),
            Err(TryAcquireError::Closed) => return Err((self.inner.shut_down(), invocation)),
        };
        let (queued, handle) = Queued::new(invocation);
        self.inner.submitted.fetch_add(1, Ordering::Relaxed);
        self.inner.spawn(queued, Start::Now(permit));
        Ok(handle)
    }

    /// Run `invocation` on the caller's task, bypassing the slots.
    pub async fn run_inline(
        &self,
        invocation: &mut dyn Invocation,
    ) -> std::result::Result<(), InvocationError> {
        lifecycle::run_inline(&self.inner.env, invocation).await
    }

    pub fn stats(&self) -> PoolStats {
        let inner = &self.inner;
        PoolStats {
            name: inner.name.clone(),
            pool_size: inner.pool_size,
            active: inner
                .pool_size
                .saturating_sub(inner.slots.available_permits()),
            waiting: inner.waiting.load(Ordering::Relaxed),
            delayed: inner.delayed.len(),
            submitted: inner.submitted.load(Ordering::Relaxed),
        }
    }

    /// Delayed invocations, soonest first.
    pub fn delayed(&self) -> Vec<DelayedTask> {
        let now = Instant::now();
        let mut tasks: Vec<DelayedTask> = self
            .inner
            .delayed
            .iter()
            .map(|entry| DelayedTask {
                label: entry.label.clone(),
                remaining: entry.due.saturating_duration_since(now),
            })
            .collect();
        tasks.sort_by_key(|t| t.remaining);
        tasks
    }

    pub fn status(&self) -> String {
        let stats = self.stats();
        let mut out = String::new();
        let _ = writeln!(out, "Pool '{}':", stats.name);
        let _ = writeln!(out, "  Pool size: {}", stats.pool_size);
        let _ = writeln!(out, "  Active count: {}", stats.active);
        let _ = writeln!(out, "  Waiting for a slot: {}", stats.waiting);
        let _ = writeln!(out, "  Delayed: {}", stats.delayed);
        let _ = writeln!(out, "  Submitted: {}", stats.submitted);
        if let Some(watcher) = self.inner.watcher.get() {
            let _ = writeln!(out, "  Awaiting completion: {}", watcher.len());
        }
        for task in self.delayed() {
            let _ = writeln!(
                out,
                "    {} will run in {} seconds",
                task.label,
                task.remaining.as_secs()
            );
        }
        out
    }

    /// Stop accepting work. Delayed and suspended invocations resolve as
    /// [`Attempt::Cancelled`]; running attempts finish normally.
    pub fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.shutdown.cancel();
        self.inner.slots.close();
        self.inner.delayed.clear();
        info!(pool = %self.inner.name, "dispatcher shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    #[cfg(test)]
    pub(crate) fn watched(&self) -> Option<usize> {
        self.inner.watcher.get().map(CompletionWatcher::len)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.inner.name)
            .field("pool_size", &self.inner.pool_size)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
