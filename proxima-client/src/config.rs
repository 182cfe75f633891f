//! Client configuration
//!
//! Connection settings for the cluster API: endpoint, API token and
//! transport tuning.

use std::time::Duration;

use crate::error::{ClientError, Result};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API endpoint (e.g., "https://pve.example.com:8006")
    pub endpoint: String,

    /// API token in `user@realm!tokenid=secret` form
    pub api_token: Option<String>,

    /// Skip TLS certificate verification
    pub insecure: bool,

    /// Timeout for a single HTTP request
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Creates a new configuration with defaults
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_token: None,
            insecure: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Sets the API token
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(ClientError::InvalidConfig("endpoint cannot be empty".into()));
        }

        if !self.endpoint.starts_with("https://") {
            return Err(ClientError::InvalidConfig(
                "endpoint must be a secure URL (valid: https://host:port/)".into(),
            ));
        }

        if matches!(&self.api_token, Some(token) if token.trim().is_empty()) {
            return Err(ClientError::InvalidConfig("api_token cannot be empty".into()));
        }

        if self.request_timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "request_timeout must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}
