//! Session addresses, lifecycle states and keys.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Protocol a session endpoint speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionProtocol {
    #[default]
    Ws,
    Http,
}

impl SessionProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for SessionProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionProtocol {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ws" => Ok(Self::Ws),
            "http" => Ok(Self::Http),
            other => Err(CoreError::Validation(format!(
                "Unknown session protocol '{other}'"
            ))),
        }
    }
}

/// Where a running session can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAddress {
    pub protocol: SessionProtocol,
    pub host: String,
    pub port: u16,
}

impl SessionAddress {
    pub fn new(protocol: SessionProtocol, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol,
            host: host.into(),
            port,
        }
    }

    /// The URL clients connect to, e.g. `ws://10.0.0.3:9000`.
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// Lifecycle of a session.
///
/// ```text
/// LAUNCHING -> RUNNING -> STOPPED
///     |           |
///     +-----------+-----> FAILED
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Launching,
    Running { url: String },
    Stopped,
    Failed { message: String },
}

impl SessionState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed { .. })
    }

    /// Whether moving from `self` to `next` follows the session lifecycle.
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        match (self, next) {
            (Self::Launching, Self::Running { .. }) => true,
            (Self::Launching | Self::Running { .. }, Self::Stopped | Self::Failed { .. }) => true,
            _ => false,
        }
    }
}

/// Length in bytes of a session key before hex encoding.
pub const SESSION_KEY_BYTES: usize = 16;

/// Generate a random hex key used to name a session and authenticate to it.
pub fn generate_session_key() -> String {
    let mut rng = rand::rng();
    (0..SESSION_KEY_BYTES)
        .map(|_| format!("{:02x}", rng.random::<u8>()))
        .collect()
}
