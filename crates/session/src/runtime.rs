use async_trait::async_trait;
use jobhub_core::session::SessionState;
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;
use crate::params::SessionParams;
use crate::reporter::SessionReporter;

/// Interval at which a session's log is sent to the reporter.
pub(crate) const LOG_FLUSH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);

/// Provisions a session and keeps it alive until it ends or `cancel` is
/// triggered.
///
/// Returns the final state, `STOPPED` or `FAILED`. Resources (pods,
/// processes) are released before returning in every case. An `Err` means
/// the session could not be provisioned at all.
#[async_trait]
pub trait SessionRuntime: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        params: &SessionParams,
        reporter: &dyn SessionReporter,
        cancel: CancellationToken,
    ) -> Result<SessionState, SessionError>;
}

/// Tracks a session through its lifecycle, logging each transition.
pub(crate) struct Lifecycle {
    name: String,
    state: SessionState,
}

impl Lifecycle {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: SessionState::Launching,
        }
    }

    pub(crate) fn transition(&mut self, next: SessionState) {
        if !self.state.can_transition_to(&next) {
            tracing::warn!(session = %self.name, from = ?self.state, to = ?next, "Ignoring session transition");
            return;
        }
        tracing::info!(session = %self.name, state = ?next, "Session state changed");
        self.state = next;
    }

    pub(crate) fn finish(mut self, next: SessionState) -> SessionState {
        self.transition(next);
        self.state
    }
}
