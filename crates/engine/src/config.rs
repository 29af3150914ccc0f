use jobhub_core::fleet::{DEFAULT_LIVENESS_WINDOW_MINUTES, DEFAULT_ZONE_ACCOUNT};

/// Orchestration configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the broker's HTTP gateway.
    pub broker_url: String,
    /// How long after its last sign of life a worker counts as live.
    pub liveness_window: chrono::Duration,
    /// Account owning the shared zones every job may run in.
    pub default_zone_account: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            broker_url: "http://localhost:5555".into(),
            liveness_window: chrono::Duration::minutes(DEFAULT_LIVENESS_WINDOW_MINUTES),
            default_zone_account: DEFAULT_ZONE_ACCOUNT.into(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `BROKER_URL`              | `http://localhost:5555` |
    /// | `WORKER_LIVENESS_MINUTES` | `15`                    |
    /// | `DEFAULT_ZONE_ACCOUNT`    | `stencila`              |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let broker_url = std::env::var("BROKER_URL").unwrap_or(defaults.broker_url);

        let liveness_minutes: i64 = std::env::var("WORKER_LIVENESS_MINUTES")
            .unwrap_or_else(|_| DEFAULT_LIVENESS_WINDOW_MINUTES.to_string())
            .parse()
            .expect("WORKER_LIVENESS_MINUTES must be a valid i64");

        let default_zone_account =
            std::env::var("DEFAULT_ZONE_ACCOUNT").unwrap_or(defaults.default_zone_account);

        Self {
            broker_url,
            liveness_window: chrono::Duration::minutes(liveness_minutes),
            default_zone_account,
        }
    }
}
