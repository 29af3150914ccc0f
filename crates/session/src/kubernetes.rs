//! Sessions run as pods in a Kubernetes cluster.
//!
//! The worker talks to the cluster's REST API directly with the service
//! account it runs under. Each session gets a single-container pod named
//! `session-{key}` that is deleted once the session ends, whatever the
//! outcome.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use futures::FutureExt;
use jobhub_core::jobs::LogEntry;
use jobhub_core::session::{generate_session_key, SessionAddress, SessionState};
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;
use crate::params::SessionParams;
use crate::reporter::{SessionLog, SessionReporter};
use crate::runtime::{Lifecycle, SessionRuntime, LOG_FLUSH_INTERVAL};

/// Name of the session container within its pod.
pub const CONTAINER_NAME: &str = "executa";

/// Credentials mounted into every pod running under a service account.
const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Attempts made to delete a session pod before giving up.
const DELETE_ATTEMPTS: u32 = 5;

// ---------------------------------------------------------------------------
// Pod status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum PodPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

/// The parts of a pod's `status` a session cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PodStatus {
    #[serde(default)]
    pub phase: PodPhase,
    #[serde(default, rename = "podIP")]
    pub pod_ip: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl PodStatus {
    pub fn new(phase: PodPhase) -> Self {
        Self {
            phase,
            ..Self::default()
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.pod_ip = Some(ip.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Cluster API
// ---------------------------------------------------------------------------

/// The pod operations a cluster session needs.
#[async_trait]
pub trait PodApi: Send + Sync {
    async fn create_pod(&self, manifest: &Value) -> Result<(), SessionError>;

    async fn pod_status(&self, name: &str) -> Result<PodStatus, SessionError>;

    /// Follow the session container's output, one item per line.
    async fn pod_log_lines(
        &self,
        name: &str,
    ) -> Result<BoxStream<'static, Result<String, SessionError>>, SessionError>;

    async fn delete_pod(&self, name: &str) -> Result<(), SessionError>;
}

/// [`PodApi`] over the Kubernetes REST API.
pub struct KubeRestApi {
    client: reqwest::Client,
    base_url: String,
    namespace: String,
    token: Option<String>,
}

impl KubeRestApi {
    /// Client for an API server at `base_url`, e.g. one exposed through
    /// `kubectl proxy`.
    pub fn new(base_url: &str, namespace: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            namespace: namespace.into(),
            token,
        }
    }

    /// Client for the cluster this process runs in, authenticated with the
    /// pod's service account.
    pub fn in_cluster(namespace: impl Into<String>) -> Result<Self, SessionError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
            SessionError::Params("KUBERNETES_SERVICE_HOST is not set".into())
        })?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".into());
        let token = std::fs::read_to_string(format!("{SERVICE_ACCOUNT_DIR}/token"))?;
        let ca = std::fs::read(format!("{SERVICE_ACCOUNT_DIR}/ca.crt"))?;

        let client = reqwest::Client::builder()
            .add_root_certificate(reqwest::Certificate::from_pem(&ca)?)
            .build()?;

        Ok(Self {
            client,
            base_url: format!("https://{host}:{port}"),
            namespace: namespace.into(),
            token: Some(token.trim().to_string()),
        })
    }

    fn pods_url(&self) -> String {
        format!("{}/api/v1/namespaces/{}/pods", self.base_url, self.namespace)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, SessionError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(SessionError::ClusterApi {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[derive(Deserialize)]
struct PodEnvelope {
    #[serde(default)]
    status: Option<PodStatus>,
}

#[async_trait]
impl PodApi for KubeRestApi {
    async fn create_pod(&self, manifest: &Value) -> Result<(), SessionError> {
        let response = self
            .authorize(self.client.post(self.pods_url()).json(manifest))
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn pod_status(&self, name: &str) -> Result<PodStatus, SessionError> {
        let url = format!("{}/{name}", self.pods_url());
        let response = self.authorize(self.client.get(url)).send().await?;
        let pod: PodEnvelope = Self::ensure_success(response).await?.json().await?;
        Ok(pod.status.unwrap_or_default())
    }

    async fn pod_log_lines(
        &self,
        name: &str,
    ) -> Result<BoxStream<'static, Result<String, SessionError>>, SessionError> {
        let url = format!(
            "{}/{name}/log?follow=true&container={CONTAINER_NAME}",
            self.pods_url()
        );
        let response = self.authorize(self.client.get(url)).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response_lines(response))
    }

    async fn delete_pod(&self, name: &str) -> Result<(), SessionError> {
        let url = format!("{}/{name}", self.pods_url());
        let response = self.authorize(self.client.delete(url)).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::ensure_success(response).await?;
        Ok(())
    }
}

struct LineReader {
    response: Option<reqwest::Response>,
    buffer: Vec<u8>,
    lines: VecDeque<String>,
}

/// Split a streamed response body into lines.
fn response_lines(response: reqwest::Response) -> BoxStream<'static, Result<String, SessionError>> {
    let reader = LineReader {
        response: Some(response),
        buffer: Vec::new(),
        lines: VecDeque::new(),
    };
    stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(line) = reader.lines.pop_front() {
                return Some((Ok(line), reader));
            }
            let response = reader.response.as_mut()?;
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    reader.buffer.extend_from_slice(&chunk);
                    reader.lines.extend(take_lines(&mut reader.buffer));
                }
                Ok(None) => {
                    reader.response = None;
                    if !reader.buffer.is_empty() {
                        let rest = std::mem::take(&mut reader.buffer);
                        reader.lines.push_back(String::from_utf8_lossy(&rest).into_owned());
                    }
                }
                Err(e) => {
                    reader.response = None;
                    return Some((Err(e.into()), reader));
                }
            }
        }
    })
    .boxed()
}

/// Remove every complete line from `buffer`, leaving a trailing partial
/// line in place.
fn take_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let Some(end) = buffer.iter().rposition(|b| *b == b'\n') else {
        return Vec::new();
    };
    let complete: Vec<u8> = buffer.drain(..=end).collect();
    complete
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| {
            String::from_utf8_lossy(line)
                .trim_end_matches('\r')
                .to_string()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Session runtime
// ---------------------------------------------------------------------------

pub struct KubernetesSession {
    api: Arc<dyn PodApi>,
    poll_interval: Duration,
}

impl KubernetesSession {
    pub fn new(api: Arc<dyn PodApi>) -> Self {
        Self {
            api,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// How often to check the pod while it is starting.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Delete the session pod, retrying transient failures. A pod the API
    /// server no longer knows about counts as deleted.
    async fn remove_pod(&self, name: &str) -> Result<(), SessionError> {
        let mut attempt = 1;
        loop {
            match self.api.delete_pod(name).await {
                Ok(()) | Err(SessionError::ClusterApi { status: 404, .. }) => {
                    tracing::info!(pod = %name, "Session pod deleted");
                    return Ok(());
                }
                Err(e) if attempt < DELETE_ATTEMPTS => {
                    tracing::warn!(pod = %name, attempt, error = %e, "Failed to delete session pod, retrying");
                    tokio::time::sleep(self.poll_interval * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(pod = %name, attempts = attempt, error = %e, "Giving up deleting session pod");
                    return Err(e);
                }
            }
        }
    }

    async fn supervise(
        &self,
        name: &str,
        params: &SessionParams,
        port: u16,
        reporter: &dyn SessionReporter,
        cancel: &CancellationToken,
        lifecycle: &mut Lifecycle,
    ) -> Result<SessionState, SessionError> {
        let status = loop {
            let status = self.api.pod_status(name).await?;
            if status.phase != PodPhase::Pending {
                break status;
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(SessionState::Stopped),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        };

        match status.phase {
            PodPhase::Running => {}
            PodPhase::Succeeded => return Ok(SessionState::Stopped),
            phase => {
                let message = status
                    .message
                    .unwrap_or_else(|| format!("Pod {name} did not start (phase {phase:?})"));
                return Ok(SessionState::Failed { message });
            }
        }
        let Some(ip) = status.pod_ip else {
            return Ok(SessionState::Failed {
                message: format!("Pod {name} is running without an IP address"),
            });
        };

        let url = SessionAddress::new(params.protocol, ip, port).url();
        if let Err(e) = reporter.running(&url).await {
            tracing::warn!(url = %url, error = %e, "Failed to report running session");
        }
        lifecycle.transition(SessionState::Running { url });

        let mut lines = match self.api.pod_log_lines(name).await {
            Ok(lines) => Some(lines),
            Err(e) => {
                tracing::warn!(pod = %name, error = %e, "Failed to follow pod log");
                None
            }
        };
        let mut log = SessionLog::default();
        let mut flush = tokio::time::interval(LOG_FLUSH_INTERVAL);

        let outcome = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(pod = %name, "Session cancelled");
                    break SessionState::Stopped;
                }
                line = next_line(&mut lines), if lines.is_some() => match line {
                    Some(Ok(line)) => log.push(LogEntry::from_line(&line)),
                    Some(Err(e)) => {
                        tracing::warn!(pod = %name, error = %e, "Pod log stream failed");
                        lines = None;
                    }
                    None => lines = None,
                },
                _ = flush.tick() => {
                    log.flush(reporter).await;
                    let status = self.api.pod_status(name).await?;
                    match status.phase {
                        PodPhase::Succeeded => break SessionState::Stopped,
                        PodPhase::Failed | PodPhase::Unknown => {
                            let message = status
                                .message
                                .unwrap_or_else(|| format!("Pod {name} failed"));
                            break SessionState::Failed { message };
                        }
                        PodPhase::Pending | PodPhase::Running => {}
                    }
                }
            }
        };

        if let Some(lines) = lines.as_mut() {
            while let Some(Ok(line)) = lines.next().now_or_never().flatten() {
                log.push(LogEntry::from_line(&line));
            }
        }
        if matches!(outcome, SessionState::Failed { .. }) {
            log.escalate();
        }
        log.flush(reporter).await;
        Ok(outcome)
    }
}

async fn next_line(
    lines: &mut Option<BoxStream<'static, Result<String, SessionError>>>,
) -> Option<Result<String, SessionError>> {
    match lines {
        Some(lines) => lines.next().await,
        None => std::future::pending().await,
    }
}

/// Manifest of the pod running session `key` on `port`.
pub fn pod_manifest(name: &str, params: &SessionParams, port: u16, key: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "labels": { "app": "jobhub-session", "session": key },
        },
        "spec": {
            "restartPolicy": "Never",
            "containers": [{
                "name": CONTAINER_NAME,
                "image": params.image,
                "command": params.cluster_args(port, key),
                "env": [{ "name": "SESSION_KEY", "value": key }],
                "ports": [{ "containerPort": port }],
            }],
        },
    })
}

#[async_trait]
impl SessionRuntime for KubernetesSession {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    async fn run(
        &self,
        params: &SessionParams,
        reporter: &dyn SessionReporter,
        cancel: CancellationToken,
    ) -> Result<SessionState, SessionError> {
        let key = generate_session_key();
        let name = format!("session-{key}");
        let port = rand::rng().random_range(1024..=u16::MAX);

        self.api
            .create_pod(&pod_manifest(&name, params, port, &key))
            .await?;
        tracing::info!(pod = %name, image = %params.image, port, "Session pod created");

        let mut lifecycle = Lifecycle::new(name.clone());
        let outcome = self
            .supervise(&name, params, port, reporter, &cancel, &mut lifecycle)
            .await;

        let deleted = self.remove_pod(&name).await;
        let state = outcome?;
        deleted?;
        Ok(lifecycle.finish(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_lines_keeps_partial_tail() {
        let mut buffer = b"one\ntwo\r\nthr".to_vec();
        assert_eq!(take_lines(&mut buffer), vec!["one", "two"]);
        assert_eq!(buffer, b"thr");

        buffer.extend_from_slice(b"ee\n");
        assert_eq!(take_lines(&mut buffer), vec!["three"]);
        assert!(buffer.is_empty());
        assert!(take_lines(&mut buffer).is_empty());
    }

    #[test]
    fn manifest_names_container_and_port() {
        let params = SessionParams::default();
        let manifest = pod_manifest("session-abc", &params, 4000, "abc");
        assert_eq!(manifest["metadata"]["name"], "session-abc");
        assert_eq!(manifest["spec"]["restartPolicy"], "Never");
        let container = &manifest["spec"]["containers"][0];
        assert_eq!(container["name"], CONTAINER_NAME);
        assert_eq!(container["image"], "stencila/executa");
        assert_eq!(container["ports"][0]["containerPort"], 4000);
        assert_eq!(container["command"][3], "--ws=0.0.0.0:4000");
    }

    #[test]
    fn pod_status_reads_cluster_fields() {
        let status: PodStatus = serde_json::from_value(json!({
            "phase": "Running",
            "podIP": "10.1.2.3",
            "hostIP": "192.168.0.1",
        }))
        .unwrap();
        assert_eq!(status, PodStatus::new(PodPhase::Running).with_ip("10.1.2.3"));

        let status: PodStatus = serde_json::from_value(json!({"phase": "Evicted"})).unwrap();
        assert_eq!(status.phase, PodPhase::Unknown);
    }
}
