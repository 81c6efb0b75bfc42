//! REST API client for the try-on service.
//!
//! Wraps task creation, status lookup and artifact download using
//! [`reqwest`]. The [`TryOnBackend`] trait is the seam the job client
//! polls through, so sessions can run against any implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Request body for `POST /try-on`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CreateTaskRequest<'a> {
    pub model_name: &'a str,
    /// Base64 photo of the person.
    pub human_image: &'a str,
    /// Base64 photo of the garment.
    pub cloth_image: &'a str,
}

/// Response from `POST /try-on`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskResponse {
    pub data: CreateTaskData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskData {
    /// Server-assigned task identifier. Absent or empty means the task was
    /// not created.
    #[serde(default)]
    pub task_id: Option<String>,
}

/// Response from `GET /try-on/{task_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatusResponse {
    pub data: TaskStatusData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatusData {
    /// Open vocabulary; see [`tryon_core::job::JobStatus::from_remote`].
    pub task_status: String,
    /// Optional human-readable detail, usually set on failure.
    #[serde(default)]
    pub task_status_msg: Option<String>,
    #[serde(default)]
    pub task_result: Option<TaskResult>,
}

impl TaskStatusData {
    /// URL of the first generated image, if any.
    pub fn first_image_url(&self) -> Option<&str> {
        self.task_result
            .as_ref()
            .and_then(|r| r.images.first())
            .map(|img| img.url.as_str())
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskResult {
    #[serde(default)]
    pub images: Vec<TaskImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskImage {
    pub url: String,
}

/// Errors from the try-on REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum TryOnApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, body).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Try-on API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// Task creation succeeded at the HTTP level but carried no task id.
    #[error("Try-on API returned no task_id")]
    MissingTaskId,
}

/// Remote operations needed to run a try-on job.
#[async_trait]
pub trait TryOnBackend: Send + Sync {
    /// Create a task and return its identifier.
    async fn create_task(&self, request: &CreateTaskRequest<'_>) -> Result<String, TryOnApiError>;

    /// Fetch the current status of a task.
    async fn task_status(&self, task_id: &str) -> Result<TaskStatusData, TryOnApiError>;
}

/// HTTP client for the try-on service.
pub struct TryOnApi {
    client: reqwest::Client,
    api_url: String,
}

impl TryOnApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `https://api-virtual-try-on.vercel.app`.
    /// * `timeout` - Per-request timeout.
    pub fn new(api_url: String, timeout: std::time::Duration) -> Result<Self, TryOnApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        let api_url = api_url.trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Download a generated artifact.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, TryOnApiError> {
        let response = self.client.get(url).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`TryOnApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, TryOnApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TryOnApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TryOnApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl TryOnBackend for TryOnApi {
    /// Sends `POST /try-on`.
    async fn create_task(&self, request: &CreateTaskRequest<'_>) -> Result<String, TryOnApiError> {
        let response = self
            .client
            .post(format!("{}/try-on", self.api_url))
            .json(request)
            .send()
            .await?;

        let parsed: CreateTaskResponse = Self::parse_response(response).await?;
        parsed
            .data
            .task_id
            .filter(|id| !id.is_empty())
            .ok_or(TryOnApiError::MissingTaskId)
    }

    /// Sends `GET /try-on/{task_id}`.
    async fn task_status(&self, task_id: &str) -> Result<TaskStatusData, TryOnApiError> {
        let response = self
            .client
            .get(format!("{}/try-on/{}", self.api_url, task_id))
            .send()
            .await?;

        let parsed: TaskStatusResponse = Self::parse_response(response).await?;
        Ok(parsed.data)
    }
}
