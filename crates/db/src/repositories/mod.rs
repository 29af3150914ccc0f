//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod callback_target_repo;
pub mod fleet_repo;
pub mod job_repo;

pub use callback_target_repo::{DoiRepo, ReviewRepo, SnapshotRepo};
pub use fleet_repo::FleetRepo;
pub use job_repo::JobRepo;
