//! Task DTOs
//!
//! Query parameters for the task endpoints.

use serde::{Deserialize, Serialize};

/// Default number of log lines fetched for diagnostics
pub const DEFAULT_LOG_LIMIT: u32 = 50;

/// Query for `GET nodes/{node}/tasks/{upid}/log`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLogQuery {
    /// First line to return (0-based)
    pub start: u32,

    /// Maximum number of lines to return
    pub limit: u32,
}

impl Default for TaskLogQuery {
    fn default() -> Self {
        Self {
            start: 0,
            limit: DEFAULT_LOG_LIMIT,
        }
    }
}
