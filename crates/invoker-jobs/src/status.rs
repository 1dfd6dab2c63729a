//! Human-readable scheduler status.

use std::fmt::Write as _;

use chrono::{DateTime, Local, Utc};
use invoker_core::EngineConfig;
use invoker_dispatch::{DelayedTask, PoolStats};

use crate::types::{JobSnapshot, Policy};

const LAST_RUN_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Timestamps are shown on the host clock, the zone cron fields match against.
fn local(instant: DateTime<Utc>) -> impl std::fmt::Display {
    instant.with_timezone(&Local).format(LAST_RUN_FORMAT)
}

pub(crate) fn render(
    config: &EngineConfig,
    stats: &PoolStats,
    shut_down: bool,
    jobs: &[JobSnapshot],
    delayed: &[DelayedTask],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Jobs execution pool:");
    let _ = writeln!(out, "~~~~~~~~~~~~~~~~~~~");
    if shut_down {
        let _ = writeln!(out, "(shut down)");
        return out;
    }
    let _ = writeln!(out, "Pool size: {}", stats.pool_size);
    let _ = writeln!(out, "Active count: {}", stats.active);
    let _ = writeln!(out, "Scheduled task count: {}", stats.submitted);
    let _ = writeln!(out, "Queue size: {}", stats.delayed + stats.waiting);

    if !jobs.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Scheduled jobs ({}):", jobs.len());
        let _ = writeln!(out, "~~~~~~~~~~~~~~~~~~~~~~~~~~");
        for job in jobs {
            let _ = write!(out, "{}", job.name);
            describe_policy(&mut out, config, &job.policy);
            match job.state.last_run {
                Some(last_run) => {
                    let _ = write!(out, " (last run at {}", local(last_run));
                    out.push_str(if job.state.was_error { " with error)" } else { ")" });
                }
                None => out.push_str(" (has never run)"),
            }
            if let Some(next) = job.state.next_planned {
                let _ = write!(out, " (next planned at {})", local(next));
            }
            out.push('\n');
        }
    }

    if !delayed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Waiting jobs:");
        let _ = writeln!(out, "~~~~~~~~~~~~~~~~~~~~~~~~~~~");
        for task in delayed {
            let _ = writeln!(
                out,
                "{} will run in {} seconds",
                task.label,
                task.remaining.as_secs()
            );
        }
    }
    out
}

fn describe_policy(out: &mut String, config: &EngineConfig, policy: &Policy) {
    let _ = match policy {
        Policy::Startup { run_async } => write!(
            out,
            " run at application start{}.",
            if *run_async { " (async)" } else { "" }
        ),
        Policy::Interval { every } => write!(out, " run every {every}."),
        Policy::Cron { expression } => write!(
            out,
            " run with cron expression {}.",
            config
                .resolve_schedule(expression)
                .unwrap_or_else(|| expression.clone())
        ),
        Policy::Stop => write!(out, " run at application stop."),
    };
}
