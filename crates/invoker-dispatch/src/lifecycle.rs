//! One attempt of an invocation's hook sequence.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use futures_util::FutureExt;
use invoker_core::{InvocationContext, InvocationError};
use tracing::{debug, warn};

use crate::env::Environment;
use crate::invocation::{Execution, Invocation};
use crate::suspend::Suspend;

/// Where an attempt ended. `finally` has already run for every variant.
#[derive(Debug)]
pub(crate) enum Step {
    Completed,
    /// `init` returned `Ok(false)`.
    Aborted,
    Suspended(Suspend),
    Failed(InvocationError),
}

/// Run `pre_init` through `finally` once.
pub(crate) async fn run_attempt(env: &Environment, invocation: &mut dyn Invocation) -> Step {
    invocation.pre_init(env);

    match invocation.init(env) {
        Ok(true) => {}
        Ok(false) => {
            invocation.finally(env, None);
            return Step::Aborted;
        }
        Err(cause) => {
            let err = invocation.on_exception(env, None, cause);
            invocation.finally(env, None);
            return Step::Failed(err);
        }
    }

    let ctx = invocation.context();
    let outcome = AssertUnwindSafe(drive(env, &mut *invocation, &ctx))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| {
            Err(anyhow::anyhow!(
                "invocation panicked: {}",
                panic_message(payload.as_ref())
            ))
        });

    let step = match outcome {
        Ok(None) => Step::Completed,
        Ok(Some(suspend)) => Step::Suspended(suspend),
        Err(cause) => Step::Failed(invocation.on_exception(env, Some(&ctx), cause)),
    };
    invocation.finally(env, Some(&ctx));
    step
}

/// `before → execute → after [→ on_success]`. `Ok(Some(_))` is a suspension.
async fn drive(
    env: &Environment,
    invocation: &mut dyn Invocation,
    ctx: &InvocationContext,
) -> anyhow::Result<Option<Suspend>> {
    invocation.before(env, ctx)?;
    match invocation.execute(ctx).await? {
        Execution::Done => {
            invocation.after(env, ctx)?;
            invocation.on_success(env, ctx)?;
            Ok(None)
        }
        Execution::Suspend(suspend) => {
            // Err and panic alike are reported; the suspension stands.
            let after = panic::catch_unwind(AssertUnwindSafe(|| invocation.after(env, ctx)))
                .unwrap_or_else(|payload| {
                    Err(anyhow::anyhow!(
                        "after hook panicked: {}",
                        panic_message(payload.as_ref())
                    ))
                });
            if let Err(cause) = after {
                let err = invocation.on_exception(env, Some(ctx), cause);
                warn!(
                    invocation_type = ctx.invocation_type(),
                    error = %err,
                    "after hook failed during suspension"
                );
            }
            Ok(Some(suspend))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run `invocation` to completion on the caller's task.
///
/// Suspension is a local retry: the call waits out the timeout or the
/// dependency and runs the whole hook sequence again. An aborted attempt
/// counts as success.
pub async fn run_inline(
    env: &Environment,
    invocation: &mut dyn Invocation,
) -> Result<(), InvocationError> {
    loop {
        match run_attempt(env, invocation).await {
            Step::Completed | Step::Aborted => return Ok(()),
            Step::Failed(err) => return Err(err),
            Step::Suspended(suspend) => {
                debug!(
                    invocation_type = invocation.invocation_type(),
                    %suspend,
                    "inline invocation suspended"
                );
                suspend.wait().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suspend::{Dependency, Promise};
    use crate::test_support::{env_with, Act, Probe};
    use invoker_core::Mode;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn completed_attempt_runs_hooks_in_order() {
        let (env, journal) = env_with(Mode::Prod, true);
        let mut probe = Probe::new(&journal, [Act::Done]);

        let step = run_attempt(&env, &mut probe).await;

        assert!(matches!(step, Step::Completed));
        assert_eq!(
            journal.events(),
            ["clear", "before", "execute", "after", "success", "finally"]
        );
    }

    #[tokio::test]
    async fn aborted_init_skips_context_hooks() {
        let (env, journal) = env_with(Mode::Prod, true);
        let mut probe = Probe::new(&journal, [Act::Done]).aborting();

        let step = run_attempt(&env, &mut probe).await;

        assert!(matches!(step, Step::Aborted));
        assert_eq!(journal.events(), ["clear", "finally(none)"]);
    }

    #[tokio::test]
    async fn prod_runtime_not_started_fails_in_init() {
        let (env, journal) = env_with(Mode::Prod, false);
        let mut probe = Probe::new(&journal, [Act::Done]);

        let step = run_attempt(&env, &mut probe).await;

        match step {
            Step::Failed(err) => {
                assert!(!err.is_domain());
                assert!(err.to_string().contains("Application is not started"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(journal.events(), ["clear", "exception(none)", "finally(none)"]);
    }

    #[tokio::test]
    async fn dev_runtime_is_started_lazily() {
        let (env, journal) = env_with(Mode::Dev, false);
        let mut probe = Probe::new(&journal, [Act::Done]);

        let step = run_attempt(&env, &mut probe).await;

        assert!(matches!(step, Step::Completed));
        assert!(env.runtime().is_started());
        assert_eq!(journal.count("detect_changes"), 1);
        assert_eq!(journal.count("start"), 1);
    }

    #[tokio::test]
    async fn domain_failure_passes_through() {
        let (env, journal) = env_with(Mode::Prod, true);
        let mut probe = Probe::new(&journal, [Act::Domain("over quota")]);

        let step = run_attempt(&env, &mut probe).await;

        match step {
            Step::Failed(err) => {
                assert!(err.is_domain());
                assert!(err.to_string().contains("over quota"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(
            journal.events(),
            ["clear", "before", "execute", "exception", "finally"]
        );
    }

    #[tokio::test]
    async fn panic_in_execute_becomes_unexpected_failure() {
        let (env, journal) = env_with(Mode::Prod, true);
        let mut probe = Probe::new(&journal, [Act::Panic]);

        let step = run_attempt(&env, &mut probe).await;

        match step {
            Step::Failed(err) => {
                assert_eq!(err.code(), "UNEXPECTED_ERROR");
                assert!(err.to_string().contains("probe exploded"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(journal.count("finally"), 1);
        assert_eq!(journal.count("after"), 0);
    }

    #[tokio::test]
    async fn suspension_runs_after_but_not_success() {
        let (env, journal) = env_with(Mode::Prod, true);
        let mut probe = Probe::new(&journal, [Act::Suspend(Suspend::Timeout(Duration::ZERO))]);

        let step = run_attempt(&env, &mut probe).await;

        assert!(matches!(step, Step::Suspended(Suspend::Timeout(_))));
        assert_eq!(
            journal.events(),
            ["clear", "before", "execute", "after", "finally"]
        );
    }

    #[tokio::test]
    async fn failing_after_still_honours_suspension() {
        let (env, journal) = env_with(Mode::Prod, true);
        let mut probe =
            Probe::new(&journal, [Act::Suspend(Suspend::Timeout(Duration::ZERO))]).failing_after();

        let step = run_attempt(&env, &mut probe).await;

        assert!(matches!(step, Step::Suspended(_)));
        assert_eq!(journal.count("exception"), 1);
        assert_eq!(journal.count("finally"), 1);
    }

    #[tokio::test]
    async fn panicking_after_still_honours_suspension() {
        let (env, journal) = env_with(Mode::Prod, true);
        let mut probe = Probe::new(
            &journal,
            [Act::Suspend(Suspend::Timeout(Duration::from_millis(10)))],
        )
        .panicking_after();

        let step = run_attempt(&env, &mut probe).await;

        assert!(matches!(step, Step::Suspended(Suspend::Timeout(_))));
        assert_eq!(journal.count("success"), 0);
        assert_eq!(journal.count("exception"), 1);
        assert_eq!(journal.count("finally"), 1);
    }

    #[tokio::test]
    async fn inline_timeout_reruns_from_pre_init() {
        let (env, journal) = env_with(Mode::Prod, true);
        let mut probe = Probe::new(
            &journal,
            [Act::Suspend(Suspend::Timeout(Duration::from_millis(100))), Act::Done],
        );

        let started = Instant::now();
        run_inline(&env, &mut probe).await.expect("inline run");

        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(journal.count("clear"), 2);
        assert_eq!(journal.count("before"), 2);
        assert_eq!(journal.count("after"), 2);
        assert_eq!(journal.count("success"), 1);
        assert_eq!(journal.count("finally"), 2);
    }

    #[tokio::test]
    async fn inline_waits_for_reporting_dependency() {
        let (env, journal) = env_with(Mode::Prod, true);
        let promise = Promise::<u8>::new();
        let mut probe = Probe::new(
            &journal,
            [
                Act::Suspend(Suspend::Wait(Dependency::reporting(promise.clone()))),
                Act::Done,
            ],
        );
        let redeemer = promise.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            redeemer.redeem(1);
        });

        run_inline(&env, &mut probe).await.expect("inline run");

        assert!(promise.is_redeemed());
        assert_eq!(journal.count("execute"), 2);
        assert_eq!(journal.count("success"), 1);
    }

    #[tokio::test]
    async fn inline_failure_returns_original_cause() {
        let (env, journal) = env_with(Mode::Prod, true);
        let mut probe = Probe::new(&journal, [Act::Domain("bad input")]);

        let err = run_inline(&env, &mut probe).await.unwrap_err();

        assert!(err.is_domain());
        assert!(err.to_string().contains("bad input"));
    }

    #[tokio::test]
    async fn plugins_see_context_markers() {
        let (env, journal) = env_with(Mode::Prod, true);
        let mut probe = Probe::new(&journal, [Act::Done]).transactional();

        run_attempt(&env, &mut probe).await;

        assert_eq!(journal.count("before[transactional]"), 1);
    }
}
