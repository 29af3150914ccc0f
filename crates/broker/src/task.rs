//! Tasks sent to the broker and the states read back from its result
//! backend.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Signal used to terminate a running task's worker process.
///
/// Workers run one task per process and treat this signal as a request to
/// stop gracefully (e.g. delete a session's pod before exiting).
pub const REVOKE_SIGNAL: &str = "SIGUSR1";

/// A task to place on a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSignature {
    /// Task name; the job's method.
    pub method: String,
    /// Keyword arguments; the job's params.
    pub kwargs: Value,
    /// Queue name.
    pub queue: String,
    /// Task id; the job's id so that results can be found by job.
    pub task_id: String,
}

/// State of a task as reported by the result backend.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    /// Unknown to the backend: queued, or never sent.
    Pending,
    Received,
    Started,
    /// Running and reporting progress (`result`, `log`, `url`).
    Running { meta: Option<Value> },
    /// Finished; the payload holds the final `result` and `log`.
    Success { payload: Option<Value> },
    Failure { error_type: String, message: String },
    Revoked,
}

static EXCEPTION_REPR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)^([A-Za-z_][A-Za-z0-9_.]*)\((?:'(.*)'|"(.*)"|(.*))\)$"#).expect("valid regex")
});

impl TaskState {
    /// Build a state from the backend's state name and optional result.
    ///
    /// Unknown state names read as `Pending` so that they leave jobs
    /// untouched.
    pub fn from_parts(state: &str, result: Option<Value>) -> Self {
        match state {
            "RECEIVED" => Self::Received,
            "STARTED" | "RETRY" => Self::Started,
            "RUNNING" => Self::Running { meta: result },
            "SUCCESS" => Self::Success { payload: result },
            "FAILURE" => {
                let (error_type, message) = parse_failure(result.as_ref());
                Self::Failure {
                    error_type,
                    message,
                }
            }
            "REVOKED" => Self::Revoked,
            _ => Self::Pending,
        }
    }
}

/// Read the exception type and message out of a failure result.
///
/// Accepts the serialized exception forms result backends produce:
/// `{"exc_type", "exc_message"}`, `{"type", "message"}` or an exception
/// repr such as `ValueError('bad input')`.
pub fn parse_failure(result: Option<&Value>) -> (String, String) {
    const UNKNOWN: &str = "Error";
    match result {
        Some(Value::Object(map)) => {
            let kind = map
                .get("exc_type")
                .or_else(|| map.get("type"))
                .and_then(Value::as_str)
                .unwrap_or(UNKNOWN);
            let message = match map.get("exc_message").or_else(|| map.get("message")) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Array(parts)) => parts
                    .iter()
                    .map(|p| p.as_str().map_or_else(|| p.to_string(), str::to_string))
                    .collect::<Vec<_>>()
                    .join(", "),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            (kind.to_string(), message)
        }
        Some(Value::String(repr)) => match EXCEPTION_REPR_RE.captures(repr) {
            Some(caps) => {
                let message = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .or_else(|| caps.get(4))
                    .map_or("", |m| m.as_str());
                (caps[1].to_string(), message.to_string())
            }
            None => (UNKNOWN.to_string(), repr.clone()),
        },
        Some(other) => (UNKNOWN.to_string(), other.to_string()),
        None => (UNKNOWN.to_string(), String::new()),
    }
}
