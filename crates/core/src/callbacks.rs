//! Completion callback targets and parsing of the job results they store.
//!
//! A job may name a single domain object to notify when it completes. The
//! set of such objects is closed, and each one has a fixed method the
//! job's result is delivered to.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// Kind of object notified when a job completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackTarget {
    /// A project snapshot; records the files the job produced.
    Snapshot,
    /// A DOI; records the registrar deposit.
    Doi,
    /// A review; stores the extracted review document.
    Review,
}

impl CallbackTarget {
    pub const ALL: [CallbackTarget; 3] = [Self::Snapshot, Self::Doi, Self::Review];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Doi => "doi",
            Self::Review => "review",
        }
    }

    /// Name of the method on the target that receives the job.
    pub fn method_name(self) -> &'static str {
        match self {
            Self::Snapshot => "copy_callback",
            Self::Doi => "register_callback",
            Self::Review => "extract_callback",
        }
    }
}

impl fmt::Display for CallbackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallbackTarget {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown callback target '{s}'")))
    }
}

/// A callback attached to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCallback {
    #[serde(rename = "type")]
    pub target: CallbackTarget,
    pub id: DbId,
}

impl JobCallback {
    pub fn new(target: CallbackTarget, id: DbId) -> Self {
        Self { target, id }
    }

    pub fn method_name(&self) -> &'static str {
        self.target.method_name()
    }

    /// Rebuild a callback from its stored columns.
    pub fn from_parts(target: &str, id: DbId, method: &str) -> Result<Self, CoreError> {
        let target: CallbackTarget = target.parse()?;
        if target.method_name() != method {
            return Err(CoreError::Validation(format!(
                "Callback method '{method}' is not defined for target '{target}'"
            )));
        }
        Ok(Self { target, id })
    }
}

// ---------------------------------------------------------------------------
// Snapshot files
// ---------------------------------------------------------------------------

/// A file produced by a snapshot job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotFile {
    pub path: String,
    pub modified: Option<Timestamp>,
    pub size: Option<i64>,
    pub mimetype: Option<String>,
    pub encoding: Option<String>,
}

/// Read the files from a snapshot job's result, a map of path to file info
/// (`modified` as seconds since the epoch, `size`, `mimetype`, `encoding`).
///
/// An empty or non-object result produces no files. Files are ordered by
/// path.
pub fn snapshot_files(result: Option<&Value>) -> Vec<SnapshotFile> {
    let Some(Value::Object(map)) = result else {
        return Vec::new();
    };
    let mut files: Vec<SnapshotFile> = map
        .iter()
        .map(|(path, info)| SnapshotFile {
            path: path.clone(),
            modified: info
                .get("modified")
                .and_then(Value::as_f64)
                .and_then(|secs| Utc.timestamp_millis_opt((secs * 1000.0) as i64).single()),
            size: info.get("size").and_then(Value::as_i64),
            mimetype: string_field(info, "mimetype"),
            encoding: string_field(info, "encoding"),
        })
        .collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}

// ---------------------------------------------------------------------------
// DOI registration
// ---------------------------------------------------------------------------

/// Registration details from a DOI `register` job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoiRegistration {
    pub deposited: Option<Timestamp>,
    pub registered: Option<Timestamp>,
    pub request: Option<Value>,
    pub response: Option<Value>,
}

/// Read registration details from a `register` job's result.
///
/// Returns `None` when the job produced no result, leaving the DOI as is.
pub fn doi_registration(result: Option<&Value>) -> Result<Option<DoiRegistration>, CoreError> {
    let Some(result) = result.filter(|v| is_truthy(v)) else {
        return Ok(None);
    };
    let date = |name: &str| -> Result<Option<Timestamp>, CoreError> {
        match result.get(name).and_then(Value::as_str).filter(|s| !s.is_empty()) {
            Some(s) => DateTime::parse_from_rfc3339(s)
                .map(|d| Some(d.with_timezone(&Utc)))
                .map_err(|e| CoreError::Validation(format!("Invalid {name} date '{s}': {e}"))),
            None => Ok(None),
        }
    };
    Ok(Some(DoiRegistration {
        deposited: date("deposited")?,
        registered: date("registered")?,
        request: result.get("request").filter(|v| !v.is_null()).cloned(),
        response: result.get("response").filter(|v| !v.is_null()).cloned(),
    }))
}

// ---------------------------------------------------------------------------
// Review extraction
// ---------------------------------------------------------------------------

/// Outcome of a review `extract` job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewExtraction {
    /// The job produced no review.
    Failed,
    Extracted {
        review: Value,
        review_date: Option<Timestamp>,
        comments: i32,
    },
}

/// Interpret an `extract` job's result as a review document.
///
/// The review date is the first of `datePublished`, `dateModified` and
/// `dateCreated` that is present.
pub fn review_extraction(result: Option<&Value>) -> ReviewExtraction {
    let Some(review) = result.filter(|v| is_truthy(v)) else {
        return ReviewExtraction::Failed;
    };
    let review_date = ["datePublished", "dateModified", "dateCreated"]
        .into_iter()
        .find_map(|key| review.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()))
        .and_then(parse_loose_date);
    let comments = review
        .get("comments")
        .and_then(Value::as_array)
        .map_or(0, |c| i32::try_from(c.len()).unwrap_or(i32::MAX));
    ReviewExtraction::Extracted {
        review: review.clone(),
        review_date,
        comments,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Empty objects, arrays and strings count as "no result".
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Object(m) => !m.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::String(s) => !s.is_empty(),
        Value::Number(_) => true,
    }
}

/// Accept full RFC 3339 timestamps and plain `YYYY-MM-DD` dates.
fn parse_loose_date(s: &str) -> Option<Timestamp> {
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn each_target_has_its_method() {
        assert_eq!(CallbackTarget::Snapshot.method_name(), "copy_callback");
        assert_eq!(CallbackTarget::Doi.method_name(), "register_callback");
        assert_eq!(CallbackTarget::Review.method_name(), "extract_callback");
    }

    #[test]
    fn callback_from_stored_parts() {
        let cb = JobCallback::from_parts("doi", 7, "register_callback").unwrap();
        assert_eq!(cb, JobCallback::new(CallbackTarget::Doi, 7));
        assert!(JobCallback::from_parts("doi", 7, "copy_callback").is_err());
        assert!(JobCallback::from_parts("account", 7, "copy_callback").is_err());
    }

    #[test]
    fn callback_serializes_type_and_id() {
        let cb = JobCallback::new(CallbackTarget::Snapshot, 3);
        assert_eq!(serde_json::to_value(cb).unwrap(), json!({"type": "snapshot", "id": 3}));
    }

    #[test]
    fn snapshot_files_from_result() {
        let result = json!({
            "b.md": {"size": 12, "mimetype": "text/markdown", "modified": 1600000000.5},
            "a.csv": {"size": 3},
        });
        let files = snapshot_files(Some(&result));
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "a.csv");
        assert_eq!(files[0].modified, None);
        assert_eq!(files[1].mimetype.as_deref(), Some("text/markdown"));
        assert_eq!(
            files[1].modified.map(|m| m.timestamp_millis()),
            Some(1_600_000_000_500)
        );
    }

    #[test]
    fn snapshot_without_result_has_no_files() {
        assert!(snapshot_files(None).is_empty());
        assert!(snapshot_files(Some(&json!([]))).is_empty());
    }

    #[test]
    fn doi_registration_parses_zulu_dates() {
        let result = json!({
            "deposited": "2020-06-01T10:00:00Z",
            "registered": null,
            "request": {"xml": "<doi/>"},
            "response": {"status": 200},
        });
        let reg = doi_registration(Some(&result)).unwrap().unwrap();
        assert_eq!(
            reg.deposited,
            Some(Utc.with_ymd_and_hms(2020, 6, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(reg.registered, None);
        assert_eq!(reg.response, Some(json!({"status": 200})));
    }

    #[test]
    fn doi_registration_without_result_is_none() {
        assert_eq!(doi_registration(None).unwrap(), None);
        assert_eq!(doi_registration(Some(&json!({}))).unwrap(), None);
    }

    #[test]
    fn doi_registration_bad_date_is_error() {
        assert!(doi_registration(Some(&json!({"deposited": "yesterday"}))).is_err());
    }

    #[test]
    fn review_extraction_prefers_published_date() {
        let review = json!({
            "type": "Review",
            "dateCreated": "2020-01-01",
            "datePublished": "2020-03-04",
            "comments": [{}, {}, {}],
        });
        assert_matches!(
            review_extraction(Some(&review)),
            ReviewExtraction::Extracted { review_date: Some(d), comments: 3, .. }
                if d == Utc.with_ymd_and_hms(2020, 3, 4, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn review_extraction_without_result_failed() {
        assert_eq!(review_extraction(None), ReviewExtraction::Failed);
        assert_eq!(review_extraction(Some(&Value::Null)), ReviewExtraction::Failed);
    }
}
