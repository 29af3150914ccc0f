//! REST client for a Flower-compatible broker gateway.
//!
//! Flower exposes the broker and result backend of a Celery deployment
//! over HTTP:
//!
//! | Operation   | Request                                                  |
//! |-------------|----------------------------------------------------------|
//! | send task   | `POST /api/task/send-task/{method}` `{kwargs, queue, task_id}` |
//! | task state  | `GET /api/task/result/{task_id}`                         |
//! | revoke      | `POST /api/task/revoke/{task_id}?terminate=..&signal=..` |

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::BrokerError;
use crate::task::{TaskSignature, TaskState};
use crate::Broker;

/// HTTP client for a broker gateway.
pub struct FlowerBroker {
    client: reqwest::Client,
    api_url: String,
}

/// Response of `GET /api/task/result/{task_id}`.
#[derive(Debug, Deserialize)]
struct TaskResultResponse {
    state: String,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

impl FlowerBroker {
    /// Create a client for the gateway at `api_url`, e.g. `http://flower:5555`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`BrokerError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, BrokerError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(BrokerError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BrokerError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl Broker for FlowerBroker {
    async fn send_task(&self, task: &TaskSignature) -> Result<(), BrokerError> {
        let body = json!({
            "kwargs": task.kwargs,
            "queue": task.queue,
            "task_id": task.task_id,
        });

        let response = self
            .client
            .post(format!("{}/api/task/send-task/{}", self.api_url, task.method))
            .json(&body)
            .send()
            .await?;

        // 404 means no task is registered under this method name.
        match Self::ensure_success(response).await {
            Err(BrokerError::ApiError { status: 404, body }) => Err(BrokerError::Refused(format!(
                "unknown task '{}': {body}",
                task.method
            ))),
            Err(e) => Err(e),
            Ok(_) => {
                tracing::debug!(task_id = %task.task_id, queue = %task.queue, method = %task.method, "Task sent");
                Ok(())
            }
        }
    }

    async fn task_state(&self, task_id: &str) -> Result<TaskState, BrokerError> {
        let response = self
            .client
            .get(format!("{}/api/task/result/{}", self.api_url, task_id))
            .send()
            .await?;

        let result: TaskResultResponse = Self::parse_response(response).await?;
        Ok(TaskState::from_parts(&result.state, result.result))
    }

    async fn revoke(&self, task_id: &str, terminate: bool, signal: &str) -> Result<(), BrokerError> {
        let response = self
            .client
            .post(format!("{}/api/task/revoke/{}", self.api_url, task_id))
            .query(&[
                ("terminate", if terminate { "true" } else { "false" }),
                ("signal", signal),
            ])
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }
}
