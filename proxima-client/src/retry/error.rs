//! Outcome of a failed retry run.

use std::error::Error as StdError;
use std::fmt;

use crate::context::Interrupt;

/// Error returned by [`Operation`](super::Operation) when it gives up
#[derive(Debug)]
pub enum RetryError<E> {
    /// A single error, passed through unchanged
    ///
    /// Returned for a non-retryable error on the first attempt, for any final
    /// error in last-error-only mode, and for wait failures of a task.
    Failed(E),

    /// Every attempt's error, oldest first
    Exhausted { operation: String, errors: Vec<E> },

    /// The context was cancelled before the operation could finish
    Cancelled { operation: String, last: Option<E> },

    /// The context's deadline passed before the operation could finish
    DeadlineExceeded { operation: String, last: Option<E> },
}

impl<E> RetryError<E> {
    pub(crate) fn interrupted(interrupt: Interrupt, operation: &str, last: Option<E>) -> Self {
        let operation = operation.to_string();
        match interrupt {
            Interrupt::Cancelled => Self::Cancelled { operation, last },
            Interrupt::DeadlineExceeded => Self::DeadlineExceeded { operation, last },
        }
    }

    /// Most recent underlying error, if any attempt produced one
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Exhausted { errors, .. } => errors.last(),
            Self::Cancelled { last, .. } | Self::DeadlineExceeded { last, .. } => last.as_ref(),
        }
    }

    /// Consume the error, keeping only the most recent underlying error
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Exhausted { mut errors, .. } => errors.pop(),
            Self::Cancelled { last, .. } | Self::DeadlineExceeded { last, .. } => last,
        }
    }

    /// Whether the run stopped because the context fired
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::DeadlineExceeded { .. })
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Failed(e) => write!(f, "{}", e),
            RetryError::Exhausted { operation, errors } => {
                write!(f, "{} failed after {} attempts:", operation, errors.len())?;
                for (n, e) in errors.iter().enumerate() {
                    write!(f, "\n#{}: {}", n + 1, e)?;
                }
                Ok(())
            }
            RetryError::Cancelled { operation, last } => {
                write!(f, "{} cancelled", operation)?;
                if let Some(e) = last {
                    write!(f, " (last error: {})", e)?;
                }
                Ok(())
            }
            RetryError::DeadlineExceeded { operation, last } => {
                write!(f, "{} did not finish before the deadline", operation)?;
                if let Some(e) = last {
                    write!(f, " (last error: {})", e)?;
                }
                Ok(())
            }
        }
    }
}

impl<E> StdError for RetryError<E>
where
    E: StdError + 'static,
{
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.last_error().map(|e| e as &(dyn StdError + 'static))
    }
}
