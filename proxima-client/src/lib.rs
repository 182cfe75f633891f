//! Proxima HTTP Client
//!
//! A type-safe client for the task side of the cluster API: dispatching
//! long-running operations, polling their UPIDs until completion, and retrying
//! them safely.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use proxima_client::retry::Operation;
//! use proxima_client::{ApiClient, CallContext, ClientConfig, TaskRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::new("https://pve.example.com:8006")
//!         .with_api_token("root@pam!ci=secret");
//!     let client = ApiClient::new(config)?;
//!     let ctx = CallContext::new().with_timeout(Duration::from_secs(600));
//!
//!     let op = Operation::task("start VM 100");
//!     client
//!         .execute_task(&ctx, &op, TaskRequest::post("nodes/pve/qemu/100/status/start"))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod retry;
pub mod tasks;

// Re-export commonly used types
pub use config::ClientConfig;
pub use context::{CallContext, Interrupt};
pub use error::{ClientError, Result};
pub use tasks::{TaskRequest, TaskStatusSource, WaitOptions};

use proxima_core::Upid;
use proxima_core::dto::api::{DataResponse, ErrorResponse};
use reqwest::{Client, Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Path prefix of the JSON API
const API_BASE_PATH: &str = "api2/json";

/// Server messages that identify transient dispatch failures
const NO_WORKER_MESSAGE: &str = "got no worker upid";
const SERVER_TIMEOUT_MESSAGE: &str = "got timeout";

/// HTTP client for the cluster API
///
/// Authentication is limited to API tokens; every request carries the
/// `Authorization` header built from the configured token.
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// Endpoint without trailing slash (e.g., "https://pve.example.com:8006")
    endpoint: String,
    /// `Authorization` header value, when a token is configured
    authorization: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl ApiClient {
    /// Create a new client from a validated configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.insecure)
            .build()?;

        Ok(Self::with_client(config, client))
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure proxies, TLS settings, etc. The
    /// configuration is used for the endpoint and token only.
    pub fn with_client(config: ClientConfig, client: Client) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            authorization: config
                .api_token
                .map(|token| format!("PVEAPIToken={}", token)),
            client,
        }
    }

    /// Get the endpoint of the cluster API
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Full URL of an API path
    fn url(&self, path: &str) -> Result<Url> {
        let url = format!(
            "{}/{}/{}",
            self.endpoint,
            API_BASE_PATH,
            path.trim_start_matches('/')
        );

        Url::parse(&url)
            .map_err(|e| ClientError::InvalidConfig(format!("invalid URL {}: {}", url, e)))
    }

    /// URL of a task on its owning node, optionally with a trailing action segment
    ///
    /// Status and log requests must go to the node that runs the task. The
    /// UPID is sent exactly as the server issued it.
    fn task_url(&self, upid: &str, action: Option<&str>) -> Result<Url> {
        let parsed = Upid::parse(upid)?;
        let mut url = self.url("nodes")?;
        let endpoint = &self.endpoint;

        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidConfig(format!("{} cannot be a base URL", endpoint)))?
            .push(&parsed.node)
            .push("tasks")
            .push(upid)
            .extend(action);

        Ok(url)
    }

    // =============================================================================
    // Requests
    // =============================================================================

    /// Perform a request and unwrap the `data` envelope
    ///
    /// `GET` and `DELETE` bodies are sent as query parameters, everything else
    /// as JSON. Returns `Ok(None)` when the response has a null or missing
    /// `data` field.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.url(path)?;
        self.send(method, url, body).await
    }

    /// `GET` a URL whose response must carry a data object
    async fn get_data<T, Q>(&self, url: Url, query: Option<&Q>) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.send(Method::GET, url, query)
            .await?
            .ok_or(ClientError::NoData)
    }

    async fn send<T, B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        debug!("{} {}", method, url);

        let mut request = self.client.request(method.clone(), url);

        if let Some(authorization) = &self.authorization {
            request = request.header(reqwest::header::AUTHORIZATION, authorization);
        }

        if let Some(body) = body {
            request = if method == Method::GET || method == Method::DELETE {
                request.query(body)
            } else {
                request.json(body)
            };
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize the JSON envelope
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<Option<T>> {
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_response(status, &body));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        let envelope: DataResponse<T> = serde_json::from_str(&text)
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))?;

        Ok(envelope.data)
    }
}

/// Map a non-2xx response to a typed error
///
/// Known transient conditions are tagged here so the retry classifier does
/// not have to rely on message text alone.
fn error_from_response(status: StatusCode, body: &str) -> ClientError {
    let code = status.as_u16();
    let parsed: ErrorResponse = serde_json::from_str(body).unwrap_or_default();

    let reason = parsed
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .or_else(|| status.canonical_reason())
        .unwrap_or("Unknown error")
        .to_string();

    if status == StatusCode::NOT_FOUND
        || (status == StatusCode::INTERNAL_SERVER_ERROR && reason.contains("does not exist"))
    {
        return ClientError::NotFound(reason);
    }

    if reason.contains(NO_WORKER_MESSAGE) || body.contains(NO_WORKER_MESSAGE) {
        return ClientError::NoWorker { status: code };
    }

    if reason.contains(SERVER_TIMEOUT_MESSAGE) || body.contains(SERVER_TIMEOUT_MESSAGE) {
        return ClientError::ServerTimeout { status: code };
    }

    let message = match parsed.summary() {
        Some(fields) => format!("{} ({})", reason, fields),
        None => reason,
    };

    ClientError::api_error(code, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig::new("https://pve.example.com:8006/")
    }

    #[test]
    fn test_client_creation() {
        let client = ApiClient::new(config()).unwrap();
        assert_eq!(client.endpoint(), "https://pve.example.com:8006");
    }

    #[test]
    fn test_client_rejects_plain_http() {
        let err = ApiClient::new(ClientConfig::new("http://pve.example.com:8006")).unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfig(_)));
    }

    #[test]
    fn test_client_with_custom_client() {
        let config = config().with_api_token("root@pam!ci=s3cr3t");
        let client = ApiClient::with_client(config, Client::new());
        assert_eq!(
            client.authorization.as_deref(),
            Some("PVEAPIToken=root@pam!ci=s3cr3t")
        );
        assert_eq!(
            client.url("/nodes/pve/tasks").unwrap().as_str(),
            "https://pve.example.com:8006/api2/json/nodes/pve/tasks"
        );
    }

    #[test]
    fn test_task_url_routes_to_owning_node() {
        let client = ApiClient::new(config()).unwrap();

        let url = client
            .task_url("UPID:pve:00061CB3:010BA69C:64EFECB0:imgcopy::root@pam:", Some("status"))
            .unwrap();
        assert_eq!(
            url.path(),
            "/api2/json/nodes/pve/tasks/UPID:pve:00061CB3:010BA69C:64EFECB0:imgcopy::root@pam:/status"
        );

        // Path separators inside a segment are escaped, never interpreted
        let url = client
            .task_url("UPID:rack/1:1:1:1:qmstart:100:root@pam:", None)
            .unwrap();
        assert_eq!(
            url.path(),
            "/api2/json/nodes/rack%2F1/tasks/UPID:rack%2F1:1:1:1:qmstart:100:root@pam:"
        );

        let err = client.task_url("UPID:pve", None).unwrap_err();
        assert!(matches!(err, ClientError::InvalidUpid(_)));
    }

    #[test]
    fn test_not_found_mapping() {
        let err = error_from_response(StatusCode::NOT_FOUND, "");
        assert!(err.is_not_found());

        let err = error_from_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"data": null, "message": "Configuration file 'nodes/pve/qemu-server/100.conf' does not exist\n"}"#,
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_transient_conditions_are_tagged() {
        let err = error_from_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"data": null, "message": "got no worker upid - start worker failed\n"}"#,
        );
        assert!(matches!(err, ClientError::NoWorker { status: 500 }));

        let err = error_from_response(StatusCode::SERVICE_UNAVAILABLE, "got timeout");
        assert!(matches!(err, ClientError::ServerTimeout { status: 503 }));

        let err = error_from_response(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert!(matches!(err, ClientError::ApiError { status: 500, .. }));
    }

    #[test]
    fn test_field_errors_are_appended() {
        let err = error_from_response(
            StatusCode::BAD_REQUEST,
            r#"{"message": "Parameter verification failed.\n", "errors": {"vmid": "invalid format - value does not look like a valid VM ID\n"}}"#,
        );

        match err {
            ClientError::ApiError { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(
                    message,
                    "Parameter verification failed. (vmid: invalid format - value does not look like a valid VM ID)"
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
