//! Session worker: executes a single `session` job per process.
//!
//! The runtime (cluster pod or local subprocess) is chosen once from the
//! [`WorkerConfig`]. Termination signals and the soft time limit both end
//! the session through one [`CancellationToken`].

pub mod config;

use std::sync::Arc;

use jobhub_core::session::SessionState;
use jobhub_session::{
    KubeRestApi, KubernetesSession, SessionError, SessionParams, SessionReporter, SessionRuntime,
    SubprocessSession,
};
use tokio_util::sync::CancellationToken;

pub use config::{ConfigError, RuntimeKind, WorkerConfig};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Build the session runtime selected by `config`.
pub fn build_runtime(config: &WorkerConfig) -> Result<Box<dyn SessionRuntime>, WorkerError> {
    let runtime: Box<dyn SessionRuntime> = match config.runtime {
        RuntimeKind::Kubernetes => {
            let api = KubeRestApi::in_cluster(config.namespace.clone())?;
            Box::new(KubernetesSession::new(Arc::new(api)))
        }
        RuntimeKind::Subprocess => match &config.session_host {
            Some(host) => Box::new(SubprocessSession::with_host(host.clone())),
            None => Box::new(SubprocessSession::new()),
        },
    };
    Ok(runtime)
}

/// Run the configured job's session to completion.
///
/// Cancels `cancel` once the time limit passes. Returns the session's final
/// state; an `Err` means the session never started.
pub async fn run_session(
    config: &WorkerConfig,
    runtime: &dyn SessionRuntime,
    reporter: &dyn SessionReporter,
    cancel: CancellationToken,
) -> Result<SessionState, WorkerError> {
    let params = SessionParams::from_value(config.params.as_ref())?;

    if let Some(limit) = config.time_limit {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(limit) => {
                    tracing::warn!(limit_secs = limit.as_secs(), "Session time limit reached");
                    cancel.cancel();
                }
                _ = cancel.cancelled() => {}
            }
        });
    }

    tracing::info!(
        job_id = config.job_id,
        runtime = runtime.name(),
        protocol = %params.protocol,
        "Starting session",
    );
    let result = runtime.run(&params, reporter, cancel.clone()).await;
    // Releases the time limit task.
    cancel.cancel();

    let state = result?;
    match &state {
        SessionState::Failed { message } => {
            tracing::error!(job_id = config.job_id, error = %message, "Session failed")
        }
        state => tracing::info!(job_id = config.job_id, state = ?state, "Session ended"),
    }
    Ok(state)
}

/// Handlers for the signals that end a session.
///
/// Installing them replaces the default action (terminating the process),
/// so they must exist before any session resource is created. SIGUSR1 is
/// what the broker sends when the job is revoked; SIGTERM and SIGINT come
/// from the process manager or an operator.
pub struct TerminationSignals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    revoke: tokio::signal::unix::Signal,
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    /// Register the handlers. Signals delivered from now on are held until
    /// [`TerminationSignals::recv`] observes them.
    #[cfg(unix)]
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            revoke: signal(SignalKind::user_defined1())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the first termination signal.
    #[cfg(unix)]
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.terminate.recv() => tracing::info!("Received SIGTERM"),
            _ = self.revoke.recv() => tracing::info!("Received SIGUSR1"),
            _ = self.interrupt.recv() => tracing::info!("Received SIGINT (Ctrl-C)"),
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl-C");
    }
}

/// Process exit code for a session outcome.
pub fn exit_code(result: &Result<SessionState, WorkerError>) -> i32 {
    match result {
        Ok(SessionState::Stopped) => 0,
        Ok(_) => 1,
        Err(_) => 2,
    }
}
