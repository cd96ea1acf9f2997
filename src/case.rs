//! Running a single case with its per-case hooks.
//!
//! # Execution Flow
//!
//! 1. **beforeEach**: On failure the case is not run; the failure is
//!    reported under the `beforeEach` hook key
//! 2. **Case**: Invoked with its context; a pending result is awaited
//! 3. **Outcome**: Skip, pass or fail with the elapsed time
//! 4. **afterEach**: On failure the hook is reported under `afterEach`;
//!    [`AfterEachPolicy`] decides whether the case result survives

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt;
use tracing::debug;

use crate::config::AfterEachPolicy;
use crate::node::{HookKind, SuiteConfig};
use crate::result::CaseResult;
use crate::value::{Callable, CaseContext, Completion, Outcome, panic_message};

/// How a callable finished once any pending value settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settled {
    Done,
    Skip,
}

/// Invokes a case or hook and waits for a pending result.
///
/// Errors, panics (in the call or while awaiting) and rejected futures all
/// come back as `Err(reason)`.
pub(crate) async fn settle(callable: &Callable, ctx: &CaseContext) -> Result<Settled, String> {
    match callable.call(ctx)? {
        Outcome::Done => Ok(Settled::Done),
        Outcome::Skip => Ok(Settled::Skip),
        Outcome::Pending(mut pending) => {
            let path = ctx.path().to_string();
            std::panic::catch_unwind(AssertUnwindSafe(|| {
                pending.subscribe(Box::new(move |status| {
                    debug!(case = %path, ?status, "Pending result settled");
                }))
            }))
            .map_err(|payload| panic_message(payload.as_ref()))?;
            match AssertUnwindSafe(pending.await_status())
                .catch_unwind()
                .await
            {
                Ok(Completion::Resolved) => Ok(Settled::Done),
                Ok(Completion::Rejected(reason)) => Err(reason),
                Err(payload) => Err(panic_message(payload.as_ref())),
            }
        }
    }
}

/// What running one case produced.
///
/// `result` is `None` when `beforeEach` stopped the case, or when an
/// `afterEach` failure replaced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRecord {
    pub result: Option<CaseResult>,
    pub hook_failure: Option<(HookKind, String)>,
}

/// Runs cases of one suite.
#[derive(Debug, Clone)]
pub struct CaseRunner {
    config: SuiteConfig,
    policy: AfterEachPolicy,
}

impl CaseRunner {
    /// Creates a runner applying the hooks in `config`.
    pub fn new(config: SuiteConfig, policy: AfterEachPolicy) -> Self {
        Self { config, policy }
    }

    /// Runs `case` between the suite's `beforeEach` and `afterEach` hooks.
    pub async fn run(&self, case: &Callable, ctx: &CaseContext) -> CaseRecord {
        if let Some(hook) = self.config.hook(HookKind::BeforeEach)
            && let Err(reason) = settle(hook, ctx).await
        {
            debug!(case = ctx.path(), "beforeEach failed: {}", reason);
            return CaseRecord {
                result: None,
                hook_failure: Some((HookKind::BeforeEach, reason)),
            };
        }

        let start = Instant::now();
        let result = match settle(case, ctx).await {
            Ok(Settled::Skip) => CaseResult::Skipped,
            Ok(Settled::Done) => CaseResult::Passed {
                duration: start.elapsed(),
            },
            Err(reason) => CaseResult::Failed {
                reason,
                duration: start.elapsed(),
            },
        };
        debug!(case = ctx.path(), ?result, "Case finished");

        let mut record = CaseRecord {
            result: Some(result),
            hook_failure: None,
        };

        if let Some(hook) = self.config.hook(HookKind::AfterEach)
            && let Err(reason) = settle(hook, ctx).await
        {
            debug!(case = ctx.path(), "afterEach failed: {}", reason);
            let skipped = matches!(record.result, Some(CaseResult::Skipped));
            if self.policy == AfterEachPolicy::Replace && !skipped {
                record.result = None;
            }
            record.hook_failure = Some((HookKind::AfterEach, reason));
        }

        record
    }
}
