//! `invoker-plugins` — the collaborators notified around every invocation.
//!
//! The engine only ever calls five notification points; plugins observe them
//! in priority order and can never suspend or fail an invocation.

pub mod registry;
pub mod types;

pub use registry::PluginRegistry;
pub use types::{Plugin, PluginEntry, PluginEvent};
