//! Reporting session progress back to the job manager.

use async_trait::async_trait;
use jobhub_core::jobs::LogEntry;
use jobhub_core::types::DbId;
use serde_json::json;

use crate::error::SessionError;

/// Receives a session's progress while it runs.
#[async_trait]
pub trait SessionReporter: Send + Sync {
    /// The session is reachable at `url`.
    async fn running(&self, url: &str) -> Result<(), SessionError>;

    /// The session's log so far. Replaces any previously reported log.
    async fn log(&self, entries: &[LogEntry]) -> Result<(), SessionError>;
}

/// Reports by patching the job through the manager's HTTP API
/// (`PATCH {manager_url}/api/v1/jobs/{job_id}`).
pub struct HttpReporter {
    client: reqwest::Client,
    job_url: String,
    token: Option<String>,
}

impl HttpReporter {
    pub fn new(manager_url: &str, job_id: DbId, token: Option<String>) -> Self {
        let job_url = format!(
            "{}/api/v1/jobs/{job_id}",
            manager_url.trim_end_matches('/')
        );
        Self {
            client: reqwest::Client::new(),
            job_url,
            token,
        }
    }

    async fn patch(&self, body: serde_json::Value) -> Result<(), SessionError> {
        let mut request = self.client.patch(&self.job_url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(SessionError::Report {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SessionReporter for HttpReporter {
    async fn running(&self, url: &str) -> Result<(), SessionError> {
        self.patch(json!({ "status": "RUNNING", "url": url })).await
    }

    async fn log(&self, entries: &[LogEntry]) -> Result<(), SessionError> {
        self.patch(json!({ "log": entries })).await
    }
}

/// A session's log, flushed to the reporter in batches.
#[derive(Debug, Default)]
pub(crate) struct SessionLog {
    entries: Vec<LogEntry>,
    dirty: bool,
}

impl SessionLog {
    pub(crate) fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
        self.dirty = true;
    }

    /// Mark every entry as an error, e.g. once the process has failed.
    pub(crate) fn escalate(&mut self) {
        for entry in &mut self.entries {
            entry.level = jobhub_core::jobs::log_level::ERROR;
        }
        self.dirty = !self.entries.is_empty();
    }

    /// Send the log if it changed since the last flush. Failures are
    /// logged and retried on the next flush.
    pub(crate) async fn flush(&mut self, reporter: &dyn SessionReporter) {
        if !self.dirty {
            return;
        }
        match reporter.log(&self.entries).await {
            Ok(()) => self.dirty = false,
            Err(e) => tracing::warn!(error = %e, "Failed to report session log"),
        }
    }
}
