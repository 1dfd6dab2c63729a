//! The runtime/environment collaborator consulted by every invocation's
//! `pre_init` and `init` hooks.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::config::Mode;

pub trait Runtime: Send + Sync {
    fn is_started(&self) -> bool;

    /// Bring the application up. Only called in dev mode; prod mode requires
    /// the runtime to be started before any invocation runs.
    fn start(&self) -> anyhow::Result<()>;

    /// Check for code changes and apply them (dev mode only). An error forces
    /// the current invocation to fail so the caller can retry after a reload.
    fn detect_changes(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn mode(&self) -> Mode;

    /// Forget ambient per-request state (locale and the like). Never fails.
    fn clear_request_state(&self) {}
}

/// A runtime with no reload machinery: a mode and a started flag.
#[derive(Debug)]
pub struct StaticRuntime {
    mode: Mode,
    started: AtomicBool,
}

impl StaticRuntime {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            started: AtomicBool::new(false),
        }
    }

    /// A runtime that is already up, as a host has it once start-up is done.
    pub fn started(mode: Mode) -> Self {
        Self {
            mode,
            started: AtomicBool::new(true),
        }
    }
}

impl Runtime for StaticRuntime {
    fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    fn start(&self) -> anyhow::Result<()> {
        if !self.started.swap(true, Ordering::AcqRel) {
            info!(mode = %self.mode, "runtime started");
        }
        Ok(())
    }

    fn mode(&self) -> Mode {
        self.mode
    }
}
