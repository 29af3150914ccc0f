use jobhub_broker::BrokerError;
use jobhub_core::error::CoreError;

use crate::store::StoreError;

/// Errors from orchestration operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A domain-level error (unknown job, invalid input).
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

pub type EngineResult<T> = Result<T, EngineError>;
