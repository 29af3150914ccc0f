#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use jobhub_core::jobs::LogEntry;
use jobhub_session::{SessionError, SessionReporter};

#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Running(String),
    Log(Vec<LogEntry>),
}

/// Reporter that keeps everything it is sent.
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<Report>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }

    pub fn running_url(&self) -> Option<String> {
        self.reports().into_iter().find_map(|r| match r {
            Report::Running(url) => Some(url),
            Report::Log(_) => None,
        })
    }

    /// The most recently reported log.
    pub fn last_log(&self) -> Vec<LogEntry> {
        self.reports()
            .into_iter()
            .rev()
            .find_map(|r| match r {
                Report::Log(entries) => Some(entries),
                Report::Running(_) => None,
            })
            .unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.last_log().into_iter().map(|e| e.message).collect()
    }
}

#[async_trait]
impl SessionReporter for RecordingReporter {
    async fn running(&self, url: &str) -> Result<(), SessionError> {
        self.reports
            .lock()
            .unwrap()
            .push(Report::Running(url.to_string()));
        Ok(())
    }

    async fn log(&self, entries: &[LogEntry]) -> Result<(), SessionError> {
        self.reports
            .lock()
            .unwrap()
            .push(Report::Log(entries.to_vec()));
        Ok(())
    }
}
