//! Error types for the Proxima client

use std::time::Duration;

use proxima_core::UpidError;
use thiserror::Error;

use crate::context::Interrupt;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when using the Proxima client
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Reason phrase, with any field errors appended
        message: String,
    },

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The node could not start a worker for the task (server overloaded)
    #[error("API error (status {status}): got no worker upid")]
    NoWorker {
        /// HTTP status code
        status: u16,
    },

    /// The server gave up waiting on an internal lock or worker
    #[error("API error (status {status}): got timeout")]
    ServerTimeout {
        /// HTTP status code
        status: u16,
    },

    /// Successful response without the expected `data` object
    #[error("the server did not include a data object in the response")]
    NoData,

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// The server returned a malformed task identifier
    #[error(transparent)]
    InvalidUpid(#[from] UpidError),

    /// The task finished with an exit status other than `OK`
    #[error("task {upid:?} failed to complete with exit status: {exit_status}")]
    TaskFailed {
        upid: String,
        exit_status: String,
    },

    /// The task was still running when the wait timeout elapsed
    #[error("timeout while waiting for task {upid:?} to complete (waited {timeout:?})")]
    TaskTimeout { upid: String, timeout: Duration },

    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline passed
    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// HTTP status code, if this error came from an HTTP response
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiError { status, .. }
            | Self::NoWorker { status }
            | Self::ServerTimeout { status } => Some(*status),
            Self::NotFound(_) => Some(404),
            Self::RequestFailed(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_)) || matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(status) if (400..500).contains(&status))
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(status) if status >= 500)
    }

    /// Check if the caller cancelled the operation or its deadline passed
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

impl From<Interrupt> for ClientError {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Cancelled => Self::Cancelled,
            Interrupt::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}
