//! Retry loops: drive attempts until success, a permanent error, the attempt
//! bound, or the context firing.

use std::error::Error as StdError;
use std::future::Future;

use tracing::{debug, info, warn};

use super::{Attempts, Operation, RetryError};
use crate::context::{CallContext, Interrupt};

/// Most errors kept for an aggregate report; older ones are dropped first
///
/// Bounds memory when an operation retries until cancelled without
/// last-error-only reporting.
pub const MAX_RECORDED_ERRORS: usize = 32;

/// Attempt bookkeeping shared by the three retry shapes
///
/// Attempts are strictly sequential: the caller awaits each attempt before
/// reporting its failure here.
struct AttemptLoop<'a, E> {
    op: &'a Operation,
    ctx: &'a CallContext,
    /// 1-based number of the attempt in progress
    attempt: u32,
    errors: Vec<E>,
}

impl<'a, E> AttemptLoop<'a, E>
where
    E: StdError + 'static,
{
    fn new(op: &'a Operation, ctx: &'a CallContext) -> Self {
        Self {
            op,
            ctx,
            attempt: 1,
            errors: Vec::new(),
        }
    }

    fn is_retry(&self) -> bool {
        self.attempt > 1
    }

    /// Stop before starting an attempt if the context already fired
    fn check(&mut self) -> Result<(), RetryError<E>> {
        self.ctx.check().map_err(|interrupt| self.interrupted(interrupt))
    }

    /// Handle a failed attempt
    ///
    /// Returns `Ok(())` once the backoff delay has elapsed and the next attempt
    /// may start, or the final error when the run is over.
    async fn failed(&mut self, err: E) -> Result<(), RetryError<E>> {
        if !self.op.is_retryable(&err) {
            return Err(self.give_up(err));
        }

        if let Attempts::Limited(max) = self.op.attempts {
            if self.attempt >= max {
                return Err(self.give_up(err));
            }
        }

        if self.op.log_on_retry {
            warn!(
                operation = %self.op.name,
                attempt = self.attempt,
                error = %err,
                "retrying {}", self.op.name
            );
        }

        let delay = self.op.delay_for(self.attempt);
        self.record(err);

        if let Err(interrupt) = self.ctx.sleep(delay).await {
            return Err(self.interrupted(interrupt));
        }

        self.attempt += 1;
        Ok(())
    }

    fn record(&mut self, err: E) {
        if self.op.last_error_only {
            self.errors.clear();
        } else if self.errors.len() >= MAX_RECORDED_ERRORS {
            self.errors.remove(0);
        }
        self.errors.push(err);
    }

    fn give_up(&mut self, err: E) -> RetryError<E> {
        if self.op.last_error_only || self.errors.is_empty() {
            return RetryError::Failed(err);
        }

        self.record(err);
        let errors = std::mem::take(&mut self.errors);
        RetryError::Exhausted {
            operation: self.op.name.clone(),
            errors,
        }
    }

    fn interrupted(&mut self, interrupt: Interrupt) -> RetryError<E> {
        debug!(
            operation = %self.op.name,
            attempt = self.attempt,
            ?interrupt,
            "retry loop interrupted"
        );
        RetryError::interrupted(interrupt, &self.op.name, self.errors.pop())
    }
}

impl Operation {
    /// Dispatch a task with retry, then wait for it once
    ///
    /// `dispatch` issues the mutating call and returns the task's UPID, or
    /// `None` when the server reports there is nothing to wait for (e.g. the
    /// guest is already running). Only `dispatch` is retried. Errors from
    /// `wait` are returned as [`RetryError::Failed`] without re-dispatching:
    /// the task already ran, and submitting it again would duplicate its
    /// side effects.
    ///
    /// When an `already_done` predicate is configured, a dispatch error on a
    /// retry attempt that matches it counts as success: the earlier attempt
    /// took effect even though its response was lost.
    pub async fn do_task<E, D, DFut, W, WFut>(
        &self,
        ctx: &CallContext,
        mut dispatch: D,
        wait: W,
    ) -> Result<(), RetryError<E>>
    where
        E: StdError + 'static,
        D: FnMut() -> DFut,
        DFut: Future<Output = Result<Option<String>, E>>,
        W: FnOnce(String) -> WFut,
        WFut: Future<Output = Result<(), E>>,
    {
        let mut attempts = AttemptLoop::new(self, ctx);

        let upid = loop {
            attempts.check()?;

            match dispatch().await {
                Ok(Some(upid)) => break upid,
                Ok(None) => {
                    debug!(operation = %self.name, "no task to wait for");
                    return Ok(());
                }
                Err(err) if attempts.is_retry() && self.is_already_done(&err) => {
                    info!(
                        operation = %self.name,
                        attempt = attempts.attempt,
                        error = %err,
                        "earlier attempt already took effect"
                    );
                    return Ok(());
                }
                Err(err) => attempts.failed(err).await?,
            }
        };

        debug!(operation = %self.name, %upid, "waiting for task");
        wait(upid).await.map_err(RetryError::Failed)
    }

    /// Run a blocking call with retry
    pub async fn run<T, E, F, Fut>(&self, ctx: &CallContext, mut f: F) -> Result<T, RetryError<E>>
    where
        E: StdError + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempts = AttemptLoop::new(self, ctx);

        loop {
            attempts.check()?;

            match f().await {
                Ok(value) => return Ok(value),
                Err(err) => attempts.failed(err).await?,
            }
        }
    }

    /// Call `f` until it succeeds, returns a non-retryable error, or the context fires
    ///
    /// With the [`Operation::poll`] preset the loop is unbounded, so the
    /// context must carry a deadline or be cancelled eventually.
    pub async fn poll_until<T, E, F, Fut>(
        &self,
        ctx: &CallContext,
        f: F,
    ) -> Result<T, RetryError<E>>
    where
        E: StdError + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(ctx, f).await
    }
}
