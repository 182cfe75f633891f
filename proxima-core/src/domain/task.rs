//! Task status domain types
//!
//! Snapshots of a cluster task as reported by the task status endpoint.
//! A snapshot is a plain value; pollers re-fetch it on every tick.

use serde::{Deserialize, Serialize};

/// `status` value reported while a task is still executing
pub const STATUS_RUNNING: &str = "running";

/// Exit status reported by a task that completed successfully
pub const EXIT_STATUS_OK: &str = "OK";

/// Prefix of the exit status of a task that completed with warnings
pub const EXIT_STATUS_WARNINGS_PREFIX: &str = "WARNINGS: ";

/// Current status of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Worker process id, when reported
    #[serde(default)]
    pub pid: Option<u64>,

    /// `running` while in flight, `stopped` once terminal
    pub status: String,

    /// Exit reason; only meaningful once the task is no longer running
    #[serde(default, rename = "exitstatus")]
    pub exit_status: Option<String>,

    #[serde(default)]
    pub upid: Option<String>,

    #[serde(default)]
    pub node: Option<String>,

    /// Task type, e.g. `qmcreate`
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    #[serde(default)]
    pub user: Option<String>,
}

impl TaskStatus {
    /// Whether the task is still executing
    pub fn is_running(&self) -> bool {
        self.status == STATUS_RUNNING
    }

    /// Exit status, or an empty string when none was reported
    pub fn exit_status(&self) -> &str {
        self.exit_status.as_deref().unwrap_or_default()
    }

    /// Whether the task finished with the `OK` exit status
    pub fn is_ok(&self) -> bool {
        !self.is_running() && self.exit_status() == EXIT_STATUS_OK
    }

    /// Whether the task finished with warnings but no errors
    pub fn has_only_warnings(&self) -> bool {
        let exit = self.exit_status();
        !self.is_running()
            && exit.starts_with(EXIT_STATUS_WARNINGS_PREFIX)
            && !exit.contains("ERROR")
    }
}

/// One line of a task log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLogLine {
    /// 1-based line number
    #[serde(rename = "n")]
    pub line_number: u64,

    /// Line text
    #[serde(rename = "t")]
    pub text: String,
}
