mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use jobhub_core::jobs::log_level;
use jobhub_core::session::SessionState;
use jobhub_session::{SessionError, SessionParams, SessionRuntime, SubprocessSession};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::RecordingReporter;

fn shell(script: &str) -> SessionParams {
    SessionParams::from_value(Some(&json!({
        "program": "sh",
        "args": ["-c", script],
    })))
    .unwrap()
}

async fn run(params: &SessionParams, reporter: &RecordingReporter) -> Result<SessionState, SessionError> {
    SubprocessSession::with_host("127.0.0.1")
        .run(params, reporter, CancellationToken::new())
        .await
}

#[tokio::test]
async fn clean_exit_stops_and_reports_log() {
    let reporter = RecordingReporter::default();
    let params = shell(r#"echo '{"level":1,"message":"careful"}' >&2; echo plain >&2"#);

    let state = run(&params, &reporter).await.unwrap();

    assert_eq!(state, SessionState::Stopped);
    let url = reporter.running_url().unwrap();
    assert!(url.starts_with("ws://127.0.0.1:"), "{url}");

    let log = reporter.last_log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].message, "careful");
    assert_eq!(log[0].level, log_level::WARN);
    assert_eq!(log[1].message, "plain");
    assert_eq!(log[1].level, log_level::INFO);
}

#[tokio::test]
async fn non_zero_exit_fails_and_escalates_log() {
    let reporter = RecordingReporter::default();
    let params = shell("echo starting >&2; echo boom >&2; exit 3");

    let state = run(&params, &reporter).await.unwrap();

    assert_matches!(state, SessionState::Failed { message } if message.contains("code 3"));
    let log = reporter.last_log();
    assert_eq!(reporter.messages(), vec!["starting", "boom"]);
    assert!(log.iter().all(|e| e.level == log_level::ERROR));
}

#[tokio::test]
async fn running_is_reported_before_exit() {
    let reporter = RecordingReporter::default();
    let params = shell("echo done >&2");

    run(&params, &reporter).await.unwrap();

    assert_matches!(reporter.reports().first(), Some(common::Report::Running(_)));
}

#[tokio::test]
async fn port_placeholder_matches_url() {
    let reporter = RecordingReporter::default();
    let params = SessionParams::from_value(Some(&json!({
        "protocol": "http",
        "program": "sh",
        "args": ["-c", "echo {port} >&2"],
    })))
    .unwrap();

    run(&params, &reporter).await.unwrap();

    let port = reporter.messages().remove(0);
    assert_eq!(
        reporter.running_url().unwrap(),
        format!("http://127.0.0.1:{port}")
    );
}

#[tokio::test]
async fn cancel_kills_the_process() {
    let reporter = RecordingReporter::default();
    let params = SessionParams::from_value(Some(&json!({
        "program": "sleep",
        "args": ["30"],
    })))
    .unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let state = tokio::time::timeout(
        Duration::from_secs(10),
        SubprocessSession::with_host("127.0.0.1").run(&params, &reporter, cancel),
    )
    .await
    .expect("session did not stop on cancel")
    .unwrap();

    assert_eq!(state, SessionState::Stopped);
    assert!(reporter.running_url().is_some());
}

#[tokio::test]
async fn runs_in_snapshot_dir() {
    let dir = tempfile::tempdir().unwrap();
    let reporter = RecordingReporter::default();
    let params = SessionParams::from_value(Some(&json!({
        "program": "sh",
        "args": ["-c", "pwd -P >&2"],
        "snapshot_dir": dir.path(),
    })))
    .unwrap();

    run(&params, &reporter).await.unwrap();

    let expected = std::fs::canonicalize(dir.path()).unwrap();
    assert_eq!(reporter.messages(), vec![expected.display().to_string()]);
}

#[tokio::test]
async fn missing_snapshot_dir_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let reporter = RecordingReporter::default();
    let params = SessionParams::from_value(Some(&json!({
        "program": "true",
        "snapshot_dir": dir.path().join("missing"),
    })))
    .unwrap();

    let result = run(&params, &reporter).await;

    assert_matches!(result, Err(SessionError::Params(_)));
    assert!(reporter.reports().is_empty());
}

#[tokio::test]
async fn unknown_program_is_an_error() {
    let reporter = RecordingReporter::default();
    let params = SessionParams::from_value(Some(&json!({
        "program": "/nonexistent/session-binary",
    })))
    .unwrap();

    assert_matches!(run(&params, &reporter).await, Err(SessionError::Io(_)));
}
