//! Retry policies for cluster API operations
//!
//! An [`Operation`] is an immutable retry policy built once per call site.
//! Three presets cover the shapes of work the API exposes:
//!
//! - [`Operation::task`]: dispatch a mutating call that returns a UPID, then
//!   wait for that task. Only the dispatch is retried.
//! - [`Operation::api_call`]: a single call that blocks server-side.
//! - [`Operation::poll`]: call repeatedly until a condition holds or the
//!   context fires.
//!
//! Every `do_task`, `run` and `poll_until` call starts a fresh attempt counter;
//! nothing is shared between invocations.

pub mod classify;
pub mod error;
mod run;

pub use classify::{error_contains, is_transient};
pub use error::RetryError;

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Predicate over an error and its source chain
pub type ErrorPredicate = Arc<dyn Fn(&(dyn StdError + 'static)) -> bool + Send + Sync>;

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default attempt bound for task and API call operations
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Largest exponent applied to the base delay
const MAX_BACKOFF_SHIFT: u32 = 16;

/// How many attempts an operation may make
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempts {
    /// At most this many attempts, the first one included
    Limited(u32),
    /// Keep going until the context is cancelled or its deadline passes
    UntilCancelled,
}

/// Shape of the delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// `base * 2^(attempt - 1)`
    Exponential,
}

/// Retry policy for one kind of API operation
#[derive(Clone)]
pub struct Operation {
    name: String,
    attempts: Attempts,
    base_delay: Duration,
    max_delay: Option<Duration>,
    backoff: Backoff,
    retry_if: ErrorPredicate,
    already_done: Option<ErrorPredicate>,
    log_on_retry: bool,
    last_error_only: bool,
}

impl Operation {
    /// Policy for UPID-returning operations (create, clone, delete, start, resize)
    ///
    /// Defaults: 3 attempts, 1s base delay, exponential backoff, retry on
    /// [`is_transient`], warn on every retry, all errors reported.
    pub fn task(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attempts: Attempts::Limited(DEFAULT_ATTEMPTS),
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: None,
            backoff: Backoff::Exponential,
            retry_if: Arc::new(is_transient),
            already_done: None,
            log_on_retry: true,
            last_error_only: false,
        }
    }

    /// Policy for synchronous calls that block server-side (e.g. `PUT .../config`)
    ///
    /// Same defaults as [`Operation::task`].
    pub fn api_call(name: impl Into<String>) -> Self {
        Self::task(name)
    }

    /// Policy for wait-for-condition loops (e.g. waiting for a VM to stop)
    ///
    /// Defaults: fixed 1s delay, no attempt limit (relies on the context),
    /// only the last error reported, no retry logging, every error retried.
    pub fn poll(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attempts: Attempts::UntilCancelled,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: None,
            backoff: Backoff::Fixed,
            retry_if: Arc::new(|_: &(dyn StdError + 'static)| true),
            already_done: None,
            log_on_retry: false,
            last_error_only: true,
        }
    }

    /// Sets the maximum number of attempts, the first one included
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Attempts::Limited(attempts.max(1));
        self
    }

    /// Removes the attempt bound; the context decides when to stop
    pub fn until_cancelled(mut self) -> Self {
        self.attempts = Attempts::UntilCancelled;
        self
    }

    /// Sets the base delay between attempts
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Caps the delay produced by exponential backoff
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the predicate that decides whether an error is worth retrying
    pub fn with_retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Arc::new(predicate);
        self
    }

    /// Sets a predicate recognising that an earlier attempt already succeeded
    ///
    /// Only consulted on retry attempts of [`Operation::do_task`]: an
    /// "already exists" error on the very first dispatch is a real conflict.
    /// Use it only when the remote operation reports a distinguishable
    /// "already exists" response.
    pub fn with_already_done<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync + 'static,
    {
        self.already_done = Some(Arc::new(predicate));
        self
    }

    pub fn with_retry_logging(mut self, enabled: bool) -> Self {
        self.log_on_retry = enabled;
        self
    }

    /// Report only the most recent error instead of every attempt's error
    pub fn with_last_error_only(mut self, enabled: bool) -> Self {
        self.last_error_only = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attempts(&self) -> Attempts {
        self.attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
                self.base_delay.saturating_mul(1 << shift)
            }
        };

        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    fn is_retryable(&self, err: &(dyn StdError + 'static)) -> bool {
        (self.retry_if)(err)
    }

    fn is_already_done(&self, err: &(dyn StdError + 'static)) -> bool {
        self.already_done.as_ref().is_some_and(|check| check(err))
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("attempts", &self.attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff", &self.backoff)
            .field("already_done", &self.already_done.is_some())
            .field("log_on_retry", &self.log_on_retry)
            .field("last_error_only", &self.last_error_only)
            .finish_non_exhaustive()
    }
}
