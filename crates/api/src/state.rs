use std::sync::Arc;

use jobhub_db::DbPool;
use jobhub_engine::{FleetRegistry, JobEngine};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<JobEngine>,
    pub fleet: Arc<FleetRegistry>,
    /// Database pool, checked by `/health`. `None` when running on the
    /// in-memory store.
    pub pool: Option<DbPool>,
    pub config: Arc<ServerConfig>,
}
