//! Client side of the task broker.
//!
//! Jobs are executed by workers listening on broker queues. This crate
//! covers the three interactions the orchestration layer needs: send a
//! task to a queue, read a task's state from the result backend and
//! revoke (terminating if started) a task.

pub mod error;
pub mod flower;
pub mod memory;
pub mod task;

use async_trait::async_trait;

pub use error::BrokerError;
pub use flower::FlowerBroker;
pub use memory::{MemoryBroker, Revocation};
pub use task::{TaskSignature, TaskState, REVOKE_SIGNAL};

/// An at-least-once task queue with a result backend.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Place a task on its queue.
    async fn send_task(&self, task: &TaskSignature) -> Result<(), BrokerError>;

    /// Current state of a task.
    async fn task_state(&self, task_id: &str) -> Result<TaskState, BrokerError>;

    /// Revoke a task. With `terminate`, a task that has started is stopped
    /// by sending `signal` to its worker process.
    async fn revoke(&self, task_id: &str, terminate: bool, signal: &str)
        -> Result<(), BrokerError>;
}
