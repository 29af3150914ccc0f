//! Fleet registry rules: queue naming, worker liveness and queue selection.
//!
//! Queues are not predefined. A worker declares the queues it listens on
//! when it comes online and the queue attributes are encoded in the name:
//!
//! ```text
//! <zone>[:<priority>][:untrusted][:interrupt]
//! ```
//!
//! e.g. `north-1:2:untrusted` is a priority 2 queue in zone `north-1` that
//! may run untrusted code.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default time span after a worker's last sign of life during which it is
/// still considered usable for dispatch.
pub const DEFAULT_LIVENESS_WINDOW_MINUTES: i64 = 15;

/// Account that owns the shared default zones.
pub const DEFAULT_ZONE_ACCOUNT: &str = "stencila";

/// Maximum length of a queue name.
const MAX_QUEUE_NAME_LEN: usize = 512;

static QUEUE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z][a-z0-9\-]*)(:[0-9])?(:untrusted)?(:interrupt)?$").expect("valid regex")
});

// ---------------------------------------------------------------------------
// Queue names
// ---------------------------------------------------------------------------

/// Attributes of a queue as encoded in its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSpec {
    pub zone: String,
    pub priority: i32,
    pub untrusted: bool,
    pub interrupt: bool,
}

/// Parse a queue name into its zone and attributes.
pub fn parse_queue_name(name: &str) -> Result<QueueSpec, CoreError> {
    if name.len() > MAX_QUEUE_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Queue name must not exceed {MAX_QUEUE_NAME_LEN} characters"
        )));
    }
    let caps = QUEUE_NAME_RE.captures(name).ok_or_else(|| {
        CoreError::Validation(format!(
            "Invalid queue name '{name}': expected <zone>[:priority][:untrusted][:interrupt]"
        ))
    })?;

    let priority = caps
        .get(2)
        .map(|m| m.as_str()[1..].parse::<i32>())
        .transpose()
        .map_err(|e| CoreError::Validation(format!("Invalid queue priority: {e}")))?
        .unwrap_or(0);

    Ok(QueueSpec {
        zone: caps[1].to_string(),
        priority,
        untrusted: caps.get(3).is_some(),
        interrupt: caps.get(4).is_some(),
    })
}

// ---------------------------------------------------------------------------
// Worker liveness
// ---------------------------------------------------------------------------

/// Is a worker live?
///
/// A worker is live if it has not finished and its last sign of life (the
/// last heartbeat, or the online event before the first heartbeat) is no
/// earlier than `live_since`.
pub fn is_worker_live(
    finished: Option<Timestamp>,
    last_seen: Option<Timestamp>,
    live_since: Timestamp,
) -> bool {
    if finished.is_some() {
        return false;
    }
    match last_seen {
        Some(seen) => seen >= live_since,
        None => false,
    }
}

/// Identify a worker across its online, heartbeat and offline events.
///
/// It is possible, but unlikely, that two live workers share a signature.
pub fn worker_signature(
    hostname: &str,
    utcoffset: Option<i32>,
    pid: Option<i32>,
    freq: Option<f64>,
    software: &str,
    os: &str,
) -> String {
    fn opt<T: ToString>(v: Option<T>) -> String {
        v.map(|v| v.to_string()).unwrap_or_else(|| "None".into())
    }
    format!(
        "{hostname}|{}|{}|{}|{software}|{os}",
        opt(utcoffset),
        opt(pid),
        opt(freq)
    )
}

/// A worker monitoring event (online, heartbeat or offline) as reported by
/// the broker's event stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerEvent {
    pub hostname: String,
    #[serde(default)]
    pub utcoffset: Option<i32>,
    #[serde(default)]
    pub pid: Option<i32>,
    #[serde(default)]
    pub freq: Option<f64>,
    #[serde(default)]
    pub sw_ident: Option<String>,
    #[serde(default)]
    pub sw_ver: Option<String>,
    #[serde(default)]
    pub sw_sys: Option<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
    // Heartbeat only.
    #[serde(default)]
    pub clock: Option<i64>,
    #[serde(default)]
    pub active: Option<i32>,
    #[serde(default)]
    pub processed: Option<i32>,
    #[serde(default)]
    pub loadavg: Option<Vec<f64>>,
}

impl WorkerEvent {
    /// `<sw_ident>-<sw_ver>`, e.g. `py-celery-5.0.2`.
    pub fn software(&self) -> String {
        format!(
            "{}-{}",
            self.sw_ident.as_deref().unwrap_or("None"),
            self.sw_ver.as_deref().unwrap_or("None")
        )
    }

    pub fn os(&self) -> String {
        self.sw_sys.clone().unwrap_or_else(|| "None".into())
    }

    pub fn signature(&self) -> String {
        worker_signature(
            &self.hostname,
            self.utcoffset,
            self.pid,
            self.freq,
            &self.software(),
            &self.os(),
        )
    }

    /// The account the worker serves: the broker virtual host it is
    /// connected to, if reported.
    pub fn account(&self) -> Option<&str> {
        self.details
            .as_ref()?
            .pointer("/stats/broker/virtual_host")?
            .as_str()
            .filter(|s| !s.is_empty() && *s != "/")
    }

    /// Names of the queues the worker listens on.
    pub fn queue_names(&self) -> Vec<String> {
        self.details
            .as_ref()
            .and_then(|d| d.get("queues"))
            .and_then(serde_json::Value::as_array)
            .map(|queues| {
                queues
                    .iter()
                    .filter_map(|q| q.get("name").and_then(serde_json::Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Queue selection
// ---------------------------------------------------------------------------

/// A queue eligible for a job, with the number of live workers on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCandidate {
    pub id: DbId,
    pub name: String,
    pub zone_id: DbId,
    pub priority: i32,
    pub live_workers: i64,
}

/// Select the queue to send a job to.
///
/// Only queues with at least one live worker qualify. The highest priority
/// wins; ties go to the lowest queue id so the choice is deterministic.
pub fn select_queue(candidates: &[QueueCandidate]) -> Option<&QueueCandidate> {
    candidates
        .iter()
        .filter(|q| q.live_workers > 0)
        .min_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
