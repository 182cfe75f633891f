//! Core domain types
//!
//! This module contains the task-level structures shared by the client and
//! the command-line tool: UPIDs and task status snapshots.

pub mod task;
pub mod upid;
