//! Completion watcher: resumes invocations suspended on handles that can only
//! be polled.
//!
//! Handles that never complete stay registered until the dispatcher shuts
//! down, at which point their invocations resolve as cancelled.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::dispatcher::{Inner, Queued};
use crate::suspend::PendingResult;

/// Fixed delay between two passes over the watched handles.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

struct Waiting {
    handle: Arc<dyn PendingResult>,
    queued: Mutex<Queued>,
}

pub(crate) struct CompletionWatcher {
    pending: Arc<DashMap<u64, Waiting>>,
    next_key: AtomicU64,
    shutdown: CancellationToken,
}

impl CompletionWatcher {
    pub(crate) fn start(
        pool: &str,
        owner: Weak<Inner>,
        runtime: &Handle,
        shutdown: CancellationToken,
    ) -> Self {
        let pending = Arc::new(DashMap::new());
        runtime.spawn(watch_loop(owner, Arc::clone(&pending), shutdown.clone()));
        info!(pool, poll_ms = POLL_INTERVAL.as_millis() as u64, "completion watcher started");
        Self {
            pending,
            next_key: AtomicU64::new(0),
            shutdown,
        }
    }

    /// Register `queued` until `handle` completes. Once the dispatcher is shut
    /// down nothing drains the map any more, so late entries are cancelled
    /// here instead.
    pub(crate) fn watch(&self, handle: Arc<dyn PendingResult>, queued: Queued) {
        if self.shutdown.is_cancelled() {
            return queued.cancel();
        }
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        self.pending.insert(
            key,
            Waiting {
                handle,
                queued: Mutex::new(queued),
            },
        );
        // Shutdown may have drained the map between the check and the insert.
        if self.shutdown.is_cancelled() {
            if let Some((_, waiting)) = self.pending.remove(&key) {
                into_queued(waiting).cancel();
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

async fn watch_loop(
    owner: Weak<Inner>,
    pending: Arc<DashMap<u64, Waiting>>,
    shutdown: CancellationToken,
) {
    loop {
        let Some(inner) = owner.upgrade() else { break };
        tick(&inner, &pending);
        drop(inner);

        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = shutdown.cancelled() => break,
        }
    }

    let keys: Vec<u64> = pending.iter().map(|entry| *entry.key()).collect();
    for key in keys {
        if let Some((_, waiting)) = pending.remove(&key) {
            into_queued(waiting).cancel();
        }
    }
    debug!("completion watcher stopped");
}

/// One pass: resume every entry whose handle reports completion.
fn tick(inner: &Arc<Inner>, pending: &DashMap<u64, Waiting>) {
    let keys: Vec<u64> = pending.iter().map(|entry| *entry.key()).collect();
    for key in keys {
        let Some(handle) = pending.get(&key).map(|entry| Arc::clone(&entry.handle)) else {
            continue;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| handle.is_done())) {
            Ok(true) => {
                // remove() hands the entry to exactly one caller.
                if let Some((_, waiting)) = pending.remove(&key) {
                    inner.resume(into_queued(waiting));
                }
            }
            Ok(false) => {}
            Err(_) => error!(key, "pending handle panicked while polled"),
        }
    }
}

fn into_queued(waiting: Waiting) -> Queued {
    waiting
        .queued
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
