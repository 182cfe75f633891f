//! Unique process identifiers (UPIDs)
//!
//! Every long-running operation on a cluster node is tracked as a task and
//! identified by a UPID string of the form:
//!
//! ```text
//! UPID:{node}:{pid}:{pstart}:{starttime}:{type}:{id}:{user}:
//! ```
//!
//! `pid`, `pstart` and `starttime` are hexadecimal. `id` may be empty for task
//! types that have no target object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Literal tag every UPID starts with
pub const UPID_TAG: &str = "UPID";

/// Number of colon-delimited fields a UPID must have (tag included)
const MIN_FIELDS: usize = 8;

/// Errors produced while parsing a UPID
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpidError {
    #[error("invalid UPID {0:?}: expected prefix \"UPID:\"")]
    MissingTag(String),

    #[error("invalid UPID {upid:?}: expected at least 8 fields, found {found}")]
    TooFewFields { upid: String, found: usize },

    #[error("invalid UPID {0:?}: node name is empty")]
    EmptyNode(String),

    #[error("invalid UPID {upid:?}: process id {value:?} is not hexadecimal")]
    InvalidPid { upid: String, value: String },

    #[error("invalid UPID {upid:?}: process start {value:?} is not hexadecimal")]
    InvalidProcessStart { upid: String, value: String },

    #[error("invalid UPID {upid:?}: start time {value:?} is not a hexadecimal timestamp")]
    InvalidStartTime { upid: String, value: String },

    #[error("invalid UPID {0:?}: task type is empty")]
    EmptyKind(String),

    #[error("invalid UPID {0:?}: user is empty")]
    EmptyPrincipal(String),

    #[error("invalid UPID {upid:?}: user {principal:?} has no realm")]
    PrincipalWithoutRealm { upid: String, principal: String },
}

/// Structured form of a task identifier
///
/// Produced by the cluster when a mutating call is accepted; the client only
/// parses it, uses it to poll, and drops it when the operation finishes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Upid {
    /// Cluster node running the task
    pub node: String,

    /// Worker process id
    pub pid: u64,

    /// Process start, in clock ticks since boot
    pub pstart: u64,

    /// Wall-clock time the task was started
    pub start_time: DateTime<Utc>,

    /// Task type, e.g. `qmcreate`, `vzclone`, `imgcopy`
    pub kind: String,

    /// Object the task acts on; empty for task types without a target
    pub target_id: String,

    /// Identity that started the task, e.g. `root@pam`
    pub principal: String,
}

impl Upid {
    /// Parse a UPID string
    ///
    /// Malformed input is always an error; a partially decoded identifier is
    /// never returned.
    pub fn parse(upid: &str) -> Result<Self, UpidError> {
        let fields: Vec<&str> = upid.splitn(MIN_FIELDS + 1, ':').collect();

        if fields[0] != UPID_TAG {
            return Err(UpidError::MissingTag(upid.to_string()));
        }

        if fields.len() < MIN_FIELDS {
            return Err(UpidError::TooFewFields {
                upid: upid.to_string(),
                found: fields.len(),
            });
        }

        let node = fields[1];
        if node.is_empty() {
            return Err(UpidError::EmptyNode(upid.to_string()));
        }

        let pid = decode_hex(fields[2]).ok_or_else(|| UpidError::InvalidPid {
            upid: upid.to_string(),
            value: fields[2].to_string(),
        })?;

        let pstart = decode_hex(fields[3]).ok_or_else(|| UpidError::InvalidProcessStart {
            upid: upid.to_string(),
            value: fields[3].to_string(),
        })?;

        let start_time = decode_hex(fields[4])
            .and_then(|secs| u32::try_from(secs).ok())
            .and_then(|secs| DateTime::from_timestamp(secs.into(), 0))
            .ok_or_else(|| UpidError::InvalidStartTime {
                upid: upid.to_string(),
                value: fields[4].to_string(),
            })?;

        let kind = fields[5];
        if kind.is_empty() {
            return Err(UpidError::EmptyKind(upid.to_string()));
        }

        let principal = fields[7];
        if principal.is_empty() {
            return Err(UpidError::EmptyPrincipal(upid.to_string()));
        }
        if !principal.contains('@') {
            return Err(UpidError::PrincipalWithoutRealm {
                upid: upid.to_string(),
                principal: principal.to_string(),
            });
        }

        Ok(Self {
            node: node.to_string(),
            pid,
            pstart,
            start_time,
            kind: kind.to_string(),
            target_id: fields[6].to_string(),
            principal: principal.to_string(),
        })
    }
}

impl fmt::Display for Upid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{:08X}:{:08X}:{:08X}:{}:{}:{}:",
            UPID_TAG,
            self.node,
            self.pid,
            self.pstart,
            self.start_time.timestamp(),
            self.kind,
            self.target_id,
            self.principal
        )
    }
}

impl FromStr for Upid {
    type Err = UpidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Upid {
    type Error = UpidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Upid> for String {
    fn from(upid: Upid) -> Self {
        upid.to_string()
    }
}

/// Decode a field made of hex digits only
///
/// `from_str_radix` alone would also accept a leading sign.
fn decode_hex(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(value, 16).ok()
}
