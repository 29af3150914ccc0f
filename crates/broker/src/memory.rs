//! In-process broker for tests and local development.
//!
//! Records every task sent and every revocation; task states are set by
//! the caller to simulate workers.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::BrokerError;
use crate::task::{TaskSignature, TaskState};
use crate::Broker;

/// A revocation request recorded by [`MemoryBroker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revocation {
    pub task_id: String,
    pub terminate: bool,
    pub signal: String,
}

#[derive(Default)]
struct Inner {
    sent: Vec<TaskSignature>,
    states: HashMap<String, TaskState>,
    revoked: Vec<Revocation>,
    refuse: Option<String>,
}

#[derive(Default)]
pub struct MemoryBroker {
    inner: Mutex<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the state the result backend reports for a task.
    pub fn set_state(&self, task_id: impl Into<String>, state: TaskState) {
        self.lock().states.insert(task_id.into(), state);
    }

    /// Refuse all subsequent tasks with `message` (or accept again with `None`).
    pub fn refuse_tasks(&self, message: Option<&str>) {
        self.lock().refuse = message.map(str::to_string);
    }

    /// All tasks sent so far, in order.
    pub fn sent(&self) -> Vec<TaskSignature> {
        self.lock().sent.clone()
    }

    /// Ids of all tasks sent so far, in order.
    pub fn sent_ids(&self) -> Vec<String> {
        self.lock().sent.iter().map(|t| t.task_id.clone()).collect()
    }

    pub fn revoked(&self) -> Vec<Revocation> {
        self.lock().revoked.clone()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn send_task(&self, task: &TaskSignature) -> Result<(), BrokerError> {
        let mut inner = self.lock();
        if let Some(message) = &inner.refuse {
            return Err(BrokerError::Refused(message.clone()));
        }
        inner.sent.push(task.clone());
        Ok(())
    }

    async fn task_state(&self, task_id: &str) -> Result<TaskState, BrokerError> {
        Ok(self
            .lock()
            .states
            .get(task_id)
            .cloned()
            .unwrap_or(TaskState::Pending))
    }

    async fn revoke(&self, task_id: &str, terminate: bool, signal: &str) -> Result<(), BrokerError> {
        let mut inner = self.lock();
        inner.revoked.push(Revocation {
            task_id: task_id.to_string(),
            terminate,
            signal: signal.to_string(),
        });
        inner.states.insert(task_id.to_string(), TaskState::Revoked);
        Ok(())
    }
}
