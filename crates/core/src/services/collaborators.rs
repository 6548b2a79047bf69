//! Operator-facing collaborators consumed by the PDB loader.

use std::sync::{Mutex, PoisonError};

/// Asks the operator a yes/no question. Used only on identity mismatch.
pub trait ConfirmationProvider: Send + Sync {
    fn ask_yes_no(&self, title: &str, message: &str) -> bool;
}

/// Answers every question with a fixed value.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl ConfirmationProvider for AutoConfirm {
    fn ask_yes_no(&self, title: &str, _message: &str) -> bool {
        tracing::debug!(title, answer = self.0, "auto-answered confirmation");
        self.0
    }
}

/// Presents the aggregated diagnostics of a run.
pub trait ReportSink: Send + Sync {
    fn show(&self, title: &str, summary: &str, full_log: &str);
}

/// One call to [`ReportSink::show`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub title: String,
    pub summary: String,
    pub full_log: String,
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct RecordingReportSink {
    reports: Mutex<Vec<Report>>,
}

impl RecordingReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl ReportSink for RecordingReportSink {
    fn show(&self, title: &str, summary: &str, full_log: &str) {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner).push(Report {
            title: title.to_string(),
            summary: summary.to_string(),
            full_log: full_log.to_string(),
        });
    }
}

/// Confirmation provider that records the questions it was asked.
#[derive(Debug)]
pub struct RecordingConfirmation {
    answer: bool,
    asked: Mutex<Vec<(String, String)>>,
}

impl RecordingConfirmation {
    pub fn new(answer: bool) -> Self {
        Self { answer, asked: Mutex::new(Vec::new()) }
    }

    /// `(title, message)` pairs in the order they were asked.
    pub fn questions(&self) -> Vec<(String, String)> {
        self.asked.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl ConfirmationProvider for RecordingConfirmation {
    fn ask_yes_no(&self, title: &str, message: &str) -> bool {
        self.asked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((title.to_string(), message.to_string()));
        self.answer
    }
}
