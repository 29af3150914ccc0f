//! Job methods, error and log payloads, and progress payload parsing.
//!
//! The progress payload is the structured `meta` an executor attaches to
//! its intermediate and final task states. Only the `result`, `log` and
//! `url` keys are meaningful to the orchestration layer.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Job method
// ---------------------------------------------------------------------------

/// Every job has exactly one method.
///
/// `Parallel`, `Series` and `Chain` are composite: their execution is
/// defined entirely by their children. All other methods are atomic and
/// are executed by a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMethod {
    Parallel,
    Series,
    Chain,
    Clean,
    Archive,
    Pull,
    Push,
    Decode,
    Encode,
    Convert,
    Pin,
    Compile,
    Build,
    Execute,
    Session,
    Sleep,
    Register,
    Extract,
}

impl JobMethod {
    pub const ALL: [JobMethod; 18] = [
        Self::Parallel,
        Self::Series,
        Self::Chain,
        Self::Clean,
        Self::Archive,
        Self::Pull,
        Self::Push,
        Self::Decode,
        Self::Encode,
        Self::Convert,
        Self::Pin,
        Self::Compile,
        Self::Build,
        Self::Execute,
        Self::Session,
        Self::Sleep,
        Self::Register,
        Self::Extract,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parallel => "parallel",
            Self::Series => "series",
            Self::Chain => "chain",
            Self::Clean => "clean",
            Self::Archive => "archive",
            Self::Pull => "pull",
            Self::Push => "push",
            Self::Decode => "decode",
            Self::Encode => "encode",
            Self::Convert => "convert",
            Self::Pin => "pin",
            Self::Compile => "compile",
            Self::Build => "build",
            Self::Execute => "execute",
            Self::Session => "session",
            Self::Sleep => "sleep",
            Self::Register => "register",
            Self::Extract => "extract",
        }
    }

    /// Is this a composite method (`parallel`, `series` or `chain`)?
    pub fn is_composite(self) -> bool {
        matches!(self, Self::Parallel | Self::Series | Self::Chain)
    }

    /// Do children of this method run one after another?
    pub fn is_sequential(self) -> bool {
        matches!(self, Self::Series | Self::Chain)
    }
}

impl fmt::Display for JobMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown job method '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Error and log payloads
// ---------------------------------------------------------------------------

/// Error recorded on a failed or rejected job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

impl JobError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// `JobError::kind` values set by the orchestration layer itself.
/// Errors raised by executors carry their own exception type.
pub mod error_kind {
    /// No queue in the job's zones had a live worker.
    pub const REJECTED_NO_QUEUE: &str = "RejectedNoQueue";
    /// A composite job had no children.
    pub const MALFORMED_GRAPH: &str = "MalformedGraph";
    /// The broker did not accept the task.
    pub const BROKER_ERROR: &str = "BrokerError";
    /// A child of a composite job failed.
    pub const EXECUTION_FAILURE: &str = "ExecutionFailure";
}

/// Log levels used in job log entries. Lower is more severe.
pub mod log_level {
    pub const ERROR: u8 = 0;
    pub const WARN: u8 = 1;
    pub const INFO: u8 = 2;
    pub const DEBUG: u8 = 3;
}

/// A single entry in a job's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default = "default_log_level")]
    pub level: u8,
    pub message: String,
}

fn default_log_level() -> u8 {
    log_level::INFO
}

impl LogEntry {
    pub fn new(level: u8, message: impl Into<String>) -> Self {
        Self {
            time: Some(chrono::Utc::now().to_rfc3339()),
            level,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(log_level::ERROR, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(log_level::INFO, message)
    }

    /// Parse a line written by an executor on stderr.
    ///
    /// JSON objects with a `message` key are taken as log entries (keeping
    /// their `level`); anything else becomes an `INFO` entry with the line
    /// as message.
    pub fn from_line(line: &str) -> Self {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(line) {
            if let Some(message) = map.get("message").and_then(Value::as_str) {
                let level = map
                    .get("level")
                    .and_then(Value::as_u64)
                    .and_then(|l| u8::try_from(l).ok())
                    .unwrap_or(log_level::INFO);
                return Self::new(level, message);
            }
        }
        Self::info(line.trim_end())
    }
}

// ---------------------------------------------------------------------------
// Progress payload
// ---------------------------------------------------------------------------

/// Fields an executor may report in its progress or final payload.
///
/// Absent keys are `None` and leave the corresponding job field untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProgressPayload {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub log: Option<Vec<LogEntry>>,
    #[serde(default)]
    pub url: Option<String>,
}

impl ProgressPayload {
    /// Extract the known fields from an arbitrary payload.
    ///
    /// Non-object payloads carry no known fields; a malformed `log` is
    /// ignored rather than failing the whole update.
    pub fn from_value(value: &Value) -> Self {
        let Value::Object(map) = value else {
            return Self::default();
        };
        Self {
            result: map.get("result").filter(|v| !v.is_null()).cloned(),
            log: map
                .get("log")
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
            url: map.get("url").and_then(Value::as_str).map(str::to_string),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_none() && self.log.is_none() && self.url.is_none()
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Length of the unguessable key used to access a job instead of its id.
pub const JOB_KEY_LENGTH: usize = 32;

/// Generate a random, hard to guess, job key.
pub fn generate_job_key() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(JOB_KEY_LENGTH)
        .map(char::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn composite_methods() {
        assert!(JobMethod::Parallel.is_composite());
        assert!(JobMethod::Series.is_composite());
        assert!(JobMethod::Chain.is_composite());
        assert!(!JobMethod::Session.is_composite());
        assert!(!JobMethod::Parallel.is_sequential());
        assert!(JobMethod::Chain.is_sequential());
    }

    #[test]
    fn method_parses_every_label() {
        for method in JobMethod::ALL {
            assert_eq!(method.as_str().parse::<JobMethod>().unwrap(), method);
        }
    }

    #[test]
    fn unknown_method_rejected() {
        assert!("teleport".parse::<JobMethod>().is_err());
    }

    #[test]
    fn job_error_serializes_type_key() {
        let err = JobError::new("RuntimeError", "boom");
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"type": "RuntimeError", "message": "boom"})
        );
    }

    #[test]
    fn log_line_json_keeps_level() {
        let entry = LogEntry::from_line(r#"{"level": 1, "message": "careful"}"#);
        assert_eq!(entry.level, log_level::WARN);
        assert_eq!(entry.message, "careful");
    }

    #[test]
    fn log_line_plain_text_is_info() {
        let entry = LogEntry::from_line("listening on 8080\n");
        assert_eq!(entry.level, log_level::INFO);
        assert_eq!(entry.message, "listening on 8080");
    }

    #[test]
    fn log_line_json_without_message_is_plain() {
        let entry = LogEntry::from_line(r#"{"level": 0}"#);
        assert_eq!(entry.level, log_level::INFO);
        assert_eq!(entry.message, r#"{"level": 0}"#);
    }

    #[test]
    fn progress_payload_picks_known_fields() {
        let payload = ProgressPayload::from_value(&json!({
            "url": "ws://10.0.0.3:9000",
            "log": [{"level": 2, "message": "started"}],
            "other": true,
        }));
        assert_eq!(payload.url.as_deref(), Some("ws://10.0.0.3:9000"));
        assert_eq!(payload.log.as_ref().map(Vec::len), Some(1));
        assert!(payload.result.is_none());
    }

    #[test]
    fn progress_payload_ignores_non_objects() {
        assert!(ProgressPayload::from_value(&json!("done")).is_empty());
        assert!(ProgressPayload::from_value(&Value::Null).is_empty());
    }

    #[test]
    fn job_key_is_alphanumeric() {
        let key = generate_job_key();
        assert_eq!(key.len(), JOB_KEY_LENGTH);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(key, generate_job_key());
    }
}
