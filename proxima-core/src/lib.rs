//! Proxima Core
//!
//! Core types for the Proxima cluster task client.
//!
//! This crate contains:
//! - Domain types: UPIDs and task status snapshots
//! - DTOs: response envelopes and query parameters for the cluster API
//!
//! Nothing in here performs I/O.

pub mod domain;
pub mod dto;

pub use domain::task::{TaskLogLine, TaskStatus};
pub use domain::upid::{Upid, UpidError};
