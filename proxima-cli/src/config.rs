//! Configuration module
//!
//! Handles CLI configuration: where the cluster API lives and how to reach it.

use std::time::Duration;

use anyhow::{Context, Result};
use proxima_client::{ApiClient, ClientConfig};

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the cluster API
    pub endpoint: String,
    pub api_token: Option<String>,
    pub insecure: bool,
    pub request_timeout: Duration,
}

impl Config {
    /// Client configuration for these settings
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.endpoint.clone(),
            api_token: self.api_token.clone(),
            insecure: self.insecure,
            request_timeout: self.request_timeout,
        }
    }

    /// Build an API client, validating the settings
    pub fn client(&self) -> Result<ApiClient> {
        ApiClient::new(self.client_config())
            .with_context(|| format!("invalid client configuration for {}", self.endpoint))
    }
}
