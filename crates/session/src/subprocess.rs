//! Sessions run as a local child process.
//!
//! Only suitable for trusted sessions: the process runs with the worker's
//! own privileges. Lines the process writes to stderr are folded into the
//! job log; JSON lines with a `message` keep their `level`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use jobhub_core::jobs::LogEntry;
use jobhub_core::session::{generate_session_key, SessionAddress, SessionState};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{ChildStderr, Command};
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;
use crate::network;
use crate::params::SessionParams;
use crate::reporter::{SessionLog, SessionReporter};
use crate::runtime::{Lifecycle, SessionRuntime, LOG_FLUSH_INTERVAL};

/// How long to keep reading stderr after the process has exited.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

type StderrLines = Lines<BufReader<ChildStderr>>;

#[derive(Debug, Clone, Default)]
pub struct SubprocessSession {
    host: Option<String>,
}

impl SubprocessSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise `host` in the session URL instead of the detected
    /// local address.
    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
        }
    }
}

#[async_trait]
impl SessionRuntime for SubprocessSession {
    fn name(&self) -> &'static str {
        "subprocess"
    }

    async fn run(
        &self,
        params: &SessionParams,
        reporter: &dyn SessionReporter,
        cancel: CancellationToken,
    ) -> Result<SessionState, SessionError> {
        let ports = network::free_ports(params.ports)?;
        let key = generate_session_key();
        let host = self
            .host
            .clone()
            .unwrap_or_else(|| network::local_ip().to_string());
        let address = SessionAddress::new(params.protocol, host, ports[0]);
        let (program, args) = params.local_command(&ports, &key);

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .env("SESSION_KEY", &key)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &params.snapshot_dir {
            if !dir.is_dir() {
                return Err(SessionError::Params(format!(
                    "Snapshot directory '{}' does not exist",
                    dir.display()
                )));
            }
            cmd.current_dir(dir);
        }

        let mut lifecycle = Lifecycle::new(format!("{program}:{}", address.port));
        let mut child = cmd.spawn()?;
        tracing::info!(program = %program, pid = child.id(), port = address.port, "Session process started");
        let mut stderr = child.stderr.take().map(|s| BufReader::new(s).lines());

        let url = address.url();
        if let Err(e) = reporter.running(&url).await {
            tracing::warn!(url = %url, error = %e, "Failed to report running session");
        }
        lifecycle.transition(SessionState::Running { url });

        let mut log = SessionLog::default();
        let mut flush = tokio::time::interval(LOG_FLUSH_INTERVAL);

        let outcome = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(pid = child.id(), "Session cancelled, killing process");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "Failed to kill session process");
                    }
                    break SessionState::Stopped;
                }
                status = child.wait() => {
                    let status = status?;
                    if let Some(lines) = stderr.as_mut() {
                        let _ = tokio::time::timeout(STDERR_DRAIN_TIMEOUT, async {
                            while let Ok(Some(line)) = lines.next_line().await {
                                log.push(LogEntry::from_line(&line));
                            }
                        })
                        .await;
                    }
                    if status.success() {
                        break SessionState::Stopped;
                    }
                    log.escalate();
                    let message = match status.code() {
                        Some(code) => format!("Session process exited with code {code}"),
                        None => "Session process was terminated by a signal".to_string(),
                    };
                    break SessionState::Failed { message };
                }
                line = next_line(&mut stderr), if stderr.is_some() => {
                    match line {
                        Ok(Some(line)) => log.push(LogEntry::from_line(&line)),
                        Ok(None) => stderr = None,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to read session stderr");
                            stderr = None;
                        }
                    }
                }
                _ = flush.tick() => log.flush(reporter).await,
            }
        };

        log.flush(reporter).await;
        Ok(lifecycle.finish(outcome))
    }
}

async fn next_line(lines: &mut Option<StderrLines>) -> std::io::Result<Option<String>> {
    match lines {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}
