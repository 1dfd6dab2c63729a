//! Suspension requests and the dependency handles an invocation can wait on.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::watcher::POLL_INTERVAL;

/// Callback registered on a self-reporting dependency.
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// An asynchronous result that announces its own completion.
pub trait CompletionSource: Send + Sync {
    /// Register `callback`; it fires exactly once, immediately when the
    /// source has already completed.
    fn on_complete(&self, callback: CompletionCallback);
}

/// An asynchronous result that can only be polled.
pub trait PendingResult: Send + Sync {
    fn is_done(&self) -> bool;
}

impl<T: Send + 'static> PendingResult for tokio::task::JoinHandle<T> {
    fn is_done(&self) -> bool {
        self.is_finished()
    }
}

/// Handle to something an invocation waits for.
#[derive(Clone)]
pub enum Dependency {
    /// Resumed by its own completion callback; never polled.
    Reporting(Arc<dyn CompletionSource>),
    /// Resumed by the completion watcher.
    Opaque(Arc<dyn PendingResult>),
}

impl Dependency {
    pub fn reporting(source: impl CompletionSource + 'static) -> Self {
        Dependency::Reporting(Arc::new(source))
    }

    pub fn opaque(handle: impl PendingResult + 'static) -> Self {
        Dependency::Opaque(Arc::new(handle))
    }

    /// Block the current task until the dependency completes.
    ///
    /// A reporting source dropped without ever completing also ends the wait,
    /// so the caller re-runs rather than hanging forever.
    pub async fn wait(&self) {
        match self {
            Dependency::Reporting(source) => {
                let (tx, rx) = oneshot::channel();
                source.on_complete(Box::new(move || {
                    let _ = tx.send(());
                }));
                let _ = rx.await;
            }
            Dependency::Opaque(handle) => {
                while !handle.is_done() {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Reporting(_) => f.write_str("Dependency::Reporting"),
            Dependency::Opaque(handle) => f
                .debug_struct("Dependency::Opaque")
                .field("done", &handle.is_done())
                .finish(),
        }
    }
}

/// Request to run the invocation again later. Exactly one trigger is set.
#[derive(Debug, Clone)]
pub enum Suspend {
    Timeout(Duration),
    Wait(Dependency),
}

impl Suspend {
    /// Wait out the suspension on the current task (inline callers only).
    pub async fn wait(&self) {
        match self {
            Suspend::Timeout(delay) => tokio::time::sleep(*delay).await,
            Suspend::Wait(dependency) => dependency.wait().await,
        }
    }
}

impl fmt::Display for Suspend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Suspend::Timeout(delay) => write!(f, "retry in {} ms", delay.as_millis()),
            Suspend::Wait(Dependency::Reporting(_)) => f.write_str("wait for completion callback"),
            Suspend::Wait(Dependency::Opaque(_)) => f.write_str("wait for polled result"),
        }
    }
}

enum PromiseState<T> {
    Pending(Vec<CompletionCallback>),
    Redeemed(T),
}

/// A write-once value that reports its own completion.
///
/// Clones share the same slot. Callbacks run on the thread that redeems the
/// promise, outside the internal lock.
pub struct Promise<T> {
    state: Arc<Mutex<PromiseState<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PromiseState::Pending(Vec::new()))),
        }
    }

    /// Store `value` and fire every registered callback. Returns `false` if
    /// the promise was already redeemed (the value is then discarded).
    pub fn redeem(&self, value: T) -> bool {
        let callbacks = {
            let mut state = self.state.lock().expect("promise poisoned");
            match &mut *state {
                PromiseState::Redeemed(_) => return false,
                PromiseState::Pending(callbacks) => {
                    let callbacks = std::mem::take(callbacks);
                    *state = PromiseState::Redeemed(value);
                    callbacks
                }
            }
        };
        for callback in callbacks {
            callback();
        }
        true
    }

    pub fn is_redeemed(&self) -> bool {
        matches!(
            *self.state.lock().expect("promise poisoned"),
            PromiseState::Redeemed(_)
        )
    }

    pub fn value(&self) -> Option<T> {
        match &*self.state.lock().expect("promise poisoned") {
            PromiseState::Redeemed(value) => Some(value.clone()),
            PromiseState::Pending(_) => None,
        }
    }

    pub fn on_redeem(&self, callback: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock().expect("promise poisoned");
        match &mut *state {
            PromiseState::Pending(callbacks) => callbacks.push(Box::new(callback)),
            PromiseState::Redeemed(_) => {
                drop(state);
                callback();
            }
        }
    }
}

impl<T: Clone + Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> CompletionSource for Promise<T> {
    fn on_complete(&self, callback: CompletionCallback) {
        self.on_redeem(callback);
    }
}

impl<T: Clone + Send + 'static> PendingResult for Promise<T> {
    fn is_done(&self) -> bool {
        self.is_redeemed()
    }
}
