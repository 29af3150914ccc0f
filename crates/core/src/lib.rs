//! Pure domain logic for job orchestration.
//!
//! Everything in this crate is free of I/O so it can be shared by the
//! database layer, the orchestration engine, the session worker and the
//! HTTP API without pulling in any of their dependencies.

pub mod callbacks;
pub mod composite;
pub mod error;
pub mod fleet;
pub mod jobs;
pub mod session;
pub mod status;
pub mod types;
