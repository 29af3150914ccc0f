use std::str::FromStr;
use std::time::Duration;

use jobhub_core::types::DbId;
use serde_json::Value;

/// Which session runtime the worker uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Kubernetes,
    Subprocess,
}

impl FromStr for RuntimeKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kubernetes" => Ok(Self::Kubernetes),
            "subprocess" => Ok(Self::Subprocess),
            other => Err(ConfigError::Invalid {
                var: "SESSION_RUNTIME",
                message: format!("unknown runtime '{other}'"),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {message}")]
    Invalid { var: &'static str, message: String },
}

/// Session worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// The `session` job this process executes.
    pub job_id: DbId,
    /// The job's params as JSON.
    pub params: Option<Value>,
    /// Base URL of the job manager API that progress is reported to.
    pub manager_url: String,
    pub manager_token: Option<String>,
    pub runtime: RuntimeKind,
    /// Soft limit on the session's lifetime.
    pub time_limit: Option<Duration>,
    /// Namespace session pods are created in.
    pub namespace: String,
    /// Host advertised for local sessions instead of the detected address.
    pub session_host: Option<String>,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                   | Default                                   |
    /// |---------------------------|-------------------------------------------|
    /// | `JOB_ID`                  | required                                  |
    /// | `JOB_PARAMS`              | none                                      |
    /// | `MANAGER_URL`             | `http://localhost:3000`                   |
    /// | `MANAGER_TOKEN`           | none                                      |
    /// | `SESSION_RUNTIME`         | `kubernetes` in a cluster, else `subprocess` |
    /// | `SESSION_TIME_LIMIT_SECS` | none                                      |
    /// | `SESSION_HOST`            | detected local address                    |
    /// | `KUBERNETES_NAMESPACE`    | `default`                                 |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let job_id = lookup("JOB_ID")
            .ok_or(ConfigError::Missing("JOB_ID"))?
            .parse::<DbId>()
            .map_err(|e| ConfigError::Invalid {
                var: "JOB_ID",
                message: e.to_string(),
            })?;

        let params = lookup("JOB_PARAMS")
            .filter(|s| !s.trim().is_empty())
            .map(|s| serde_json::from_str::<Value>(&s))
            .transpose()
            .map_err(|e| ConfigError::Invalid {
                var: "JOB_PARAMS",
                message: e.to_string(),
            })?;

        let manager_url = lookup("MANAGER_URL").unwrap_or_else(|| "http://localhost:3000".into());

        let runtime = match lookup("SESSION_RUNTIME") {
            Some(name) => name.parse()?,
            None if lookup("KUBERNETES_SERVICE_HOST").is_some() => RuntimeKind::Kubernetes,
            None => RuntimeKind::Subprocess,
        };

        let time_limit = lookup("SESSION_TIME_LIMIT_SECS")
            .map(|s| s.parse::<u64>())
            .transpose()
            .map_err(|e| ConfigError::Invalid {
                var: "SESSION_TIME_LIMIT_SECS",
                message: e.to_string(),
            })?
            .map(Duration::from_secs);

        Ok(Self {
            job_id,
            params,
            manager_url,
            manager_token: lookup("MANAGER_TOKEN"),
            runtime,
            time_limit,
            namespace: lookup("KUBERNETES_NAMESPACE").unwrap_or_else(|| "default".into()),
            session_host: lookup("SESSION_HOST"),
        })
    }
}
