//! API envelope DTOs
//!
//! Every JSON response of the cluster API wraps its payload in a `data`
//! object; failed requests may carry per-parameter messages in `errors`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Standard `{ "data": ... }` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: Option<T>,
}

/// Body of a non-2xx response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Top-level error message, when the server sends one
    #[serde(default)]
    pub message: Option<String>,

    /// Parameter name to validation message
    #[serde(default)]
    pub errors: Option<BTreeMap<String, String>>,
}

impl ErrorResponse {
    /// Flatten the per-parameter messages into `name: message - name: message`
    ///
    /// Returns `None` when the body carried no field errors.
    pub fn summary(&self) -> Option<String> {
        let errors = self.errors.as_ref().filter(|e| !e.is_empty())?;

        let parts: Vec<String> = errors
            .iter()
            .map(|(name, message)| format!("{}: {}", name, message.trim_end_matches(['\r', '\n'])))
            .collect();

        Some(parts.join(" - "))
    }
}
