//! `invoker-dispatch` — bounded invocation pool with cooperative suspension.
//!
//! # Overview
//!
//! An [`Invocation`] is a unit of work with a fixed hook sequence
//! (`pre_init → init → before → execute → after → on_success`, with
//! `on_exception` on failure and `finally` on every path). The
//! [`Dispatcher`] runs attempts on a fixed number of slots and refuses new
//! work when every slot is busy.
//!
//! `execute` may return [`Execution::Suspend`] instead of finishing. The slot
//! is released and the invocation comes back later, from the top of its hook
//! sequence:
//!
//! | Suspend variant                  | Resumed by                           |
//! |----------------------------------|--------------------------------------|
//! | `Timeout(d)`                     | the dispatcher's delayed path        |
//! | `Wait(Dependency::Reporting(_))` | the dependency's completion callback |
//! | `Wait(Dependency::Opaque(_))`    | the completion watcher (50 ms poll)  |
//!
//! Callers that own their own task and cannot be rescheduled use
//! [`run_inline`], which waits out suspensions in place.

pub mod dispatcher;
pub mod env;
pub mod error;
pub mod invocation;
pub mod lifecycle;
pub mod suspend;
mod watcher;

#[cfg(test)]
mod test_support;

pub use dispatcher::{Attempt, DelayedTask, Dispatcher, InvocationHandle, PoolStats};
pub use env::Environment;
pub use error::{DispatchError, Result};
pub use invocation::{Execution, Invocation};
pub use lifecycle::run_inline;
pub use suspend::{CompletionSource, Dependency, PendingResult, Promise, Suspend};
pub use watcher::POLL_INTERVAL;
