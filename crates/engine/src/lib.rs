//! Job orchestration: dispatching job trees onto worker queues, keeping
//! job status in step with the broker, cancellation and completion
//! callbacks.
//!
//! [`JobEngine`] is the entry point. It works against the [`JobStore`] and
//! [`FleetStore`] seams and an injected [`Broker`](jobhub_broker::Broker),
//! so the same code runs on PostgreSQL in production and fully in memory
//! in tests.

pub mod callbacks;
pub mod config;
pub mod error;
pub mod fleet;
pub mod store;

mod cancel;
mod dispatch;
mod engine;
mod sync;

pub use callbacks::{CallbackRegistry, OnJobComplete};
pub use config::EngineConfig;
pub use engine::JobEngine;
pub use error::{EngineError, EngineResult};
pub use fleet::FleetRegistry;
pub use store::{FleetStore, JobStore, MemoryStore, PgStore, StoreError};
