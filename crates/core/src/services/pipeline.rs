//! PDB load orchestration.
//!
//! One run acquires the program's analysis slot, checks that the debug file belongs to the
//! program, parses it with the selected backend, applies the records, runs the demangle
//! post-pass and finally surfaces whatever the diagnostics log collected. The slot is held for
//! the whole sequence and released on every exit path by [`AnalysisSlot`]'s `Drop`.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::CancelToken;
use crate::db::{PdbLoadRunRecord, PdbLoadStatus};
use crate::diagnostics::DiagnosticsLog;
use crate::identity::{self, IdentityCheck};
use crate::program::Program;
use crate::scheduler::{AnalysisScheduler, AnalysisSlot, SchedulerError, SchedulerOptions};
use crate::services::applicator::Applied;
use crate::services::backends::{
    ApplicatorOptions, BackendError, BackendSelection, DebugInfoBackend, ReaderOptions,
    SelectedBackend,
};
use crate::services::collaborators::{ConfirmationProvider, ReportSink};
use crate::services::demangle::{self, DemangleSummary};

pub const WORKER_NAME: &str = "Load PDB";
pub const CONFIRM_TITLE: &str = "Confirm PDB Load";
pub const REPORT_TITLE: &str = "Load PDB File";
pub const REPORT_SUMMARY: &str = "There were warnings/errors loading the PDB file.";
pub const FAILURE_TITLE: &str = "Load PDB Failed";

/// Per-run settings, persisted as the `load` section of the project config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSettings {
    #[serde(default)]
    pub backend: BackendSelection,
    /// Dump tool used by the legacy backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump_tool: Option<PathBuf>,
    #[serde(default)]
    pub applicator: ApplicatorOptions,
    #[serde(default)]
    pub reader: ReaderOptions,
    /// Give up waiting for the analysis slot after this many milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_timeout_ms: Option<u64>,
    /// Persist a run history row for every completed run.
    #[serde(default = "default_record_runs")]
    pub record_runs: bool,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            backend: BackendSelection::default(),
            dump_tool: None,
            applicator: ApplicatorOptions::default(),
            reader: ReaderOptions::default(),
            slot_timeout_ms: None,
            record_runs: default_record_runs(),
        }
    }
}

fn default_record_runs() -> bool {
    true
}

impl LoadSettings {
    pub fn backend(&self) -> SelectedBackend {
        SelectedBackend::new(self.backend, self.dump_tool.clone())
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            acquire_timeout: self.slot_timeout_ms.map(Duration::from_millis),
            ..SchedulerOptions::default()
        }
    }
}

/// What to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub debug_file: PathBuf,
    /// SHA-256 of the debug file, recorded in run history when known.
    pub debug_file_hash: Option<String>,
}

impl LoadRequest {
    pub fn new(debug_file: impl Into<PathBuf>) -> Self {
        Self { debug_file: debug_file.into(), debug_file_hash: None }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.debug_file_hash = Some(hash.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    AwaitingSlot,
    Verifying,
    AwaitingConfirmation,
    Parsing,
    Applying,
    Demangling,
    Done,
    Aborted,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Aborted | PipelineState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::AwaitingSlot => "awaiting_slot",
            PipelineState::Verifying => "verifying",
            PipelineState::AwaitingConfirmation => "awaiting_confirmation",
            PipelineState::Parsing => "parsing",
            PipelineState::Applying => "applying",
            PipelineState::Demangling => "demangling",
            PipelineState::Done => "done",
            PipelineState::Aborted => "aborted",
            PipelineState::Failed => "failed",
        }
    }
}

/// Value returned by the unit of work run under the analysis slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    Completed,
    /// Stopped early; whatever was applied is kept.
    Cancelled,
    /// The operator declined a mismatched debug file.
    Aborted,
    Failed,
}

impl WorkerOutcome {
    fn terminal_state(self) -> PipelineState {
        match self {
            WorkerOutcome::Completed | WorkerOutcome::Cancelled => PipelineState::Done,
            WorkerOutcome::Aborted => PipelineState::Aborted,
            WorkerOutcome::Failed => PipelineState::Failed,
        }
    }

    fn run_status(self) -> Option<PdbLoadStatus> {
        match self {
            WorkerOutcome::Completed => Some(PdbLoadStatus::Succeeded),
            WorkerOutcome::Cancelled => Some(PdbLoadStatus::Cancelled),
            WorkerOutcome::Failed => Some(PdbLoadStatus::Failed),
            WorkerOutcome::Aborted => None,
        }
    }
}

/// Result of one pipeline run that obtained (or gave up waiting for) the analysis slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    /// Terminal state.
    pub state: PipelineState,
    /// Every state entered, starting at `Idle`.
    pub trace: Vec<PipelineState>,
    pub backend: String,
    pub applied: Option<Applied>,
    pub demangled: Option<DemangleSummary>,
    pub cancelled: bool,
    /// Diagnostics collected during the run, in order.
    pub messages: Vec<String>,
}

impl PipelineOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Done
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The analysis slot was never granted.
    #[error("Analysis slot unavailable: {0}")]
    SchedulerUnavailable(String),
}

/// Coordinates one PDB load against the collaborators it needs.
pub struct PdbLoader<'a> {
    pub scheduler: &'a AnalysisScheduler,
    pub confirm: &'a dyn ConfirmationProvider,
    pub report: &'a dyn ReportSink,
}

impl<'a> PdbLoader<'a> {
    /// Load `request` into `program` with the backend chosen by `settings`.
    pub fn run(
        &self,
        program: &Program,
        request: &LoadRequest,
        settings: &LoadSettings,
        cancel: &CancelToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        let backend = settings.backend();
        self.run_with_backend(program, request, backend.as_backend(), settings, cancel)
    }

    /// Same as [`PdbLoader::run`] with an explicit backend instance.
    pub fn run_with_backend(
        &self,
        program: &Program,
        request: &LoadRequest,
        backend: &dyn DebugInfoBackend,
        settings: &LoadSettings,
        cancel: &CancelToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        let started_at = Utc::now().to_rfc3339();
        let mut run = RunState::default();
        run.enter(PipelineState::AwaitingSlot);
        tracing::info!(
            program = program.name(),
            file = %request.debug_file.display(),
            backend = backend.name(),
            "loading PDB"
        );

        let scheduled = self.scheduler.schedule_exclusive(program, WORKER_NAME, cancel, |slot| {
            let outcome = self.work(slot, request, backend, settings, cancel, &mut run);
            run.enter(outcome.terminal_state());
            if settings.record_runs {
                record_run(slot, request, backend, outcome, run.log.len(), started_at);
            }
            outcome
        });

        match scheduled {
            Ok(outcome) => {
                tracing::info!(
                    program = program.name(),
                    outcome = ?outcome,
                    messages = run.log.len(),
                    "PDB load finished"
                );
            }
            Err(SchedulerError::Cancelled) => {
                run.cancelled = true;
                run.log.append("PDB load cancelled while waiting for the analysis slot");
                run.enter(PipelineState::Done);
            }
            Err(SchedulerError::Unavailable(reason)) => {
                tracing::error!(program = program.name(), %reason, "analysis slot unavailable");
                self.report.show(
                    FAILURE_TITLE,
                    &format!("Error processing PDB file: {}.\n{reason}", request.debug_file.display()),
                    &run.log.to_string(),
                );
                return Err(PipelineError::SchedulerUnavailable(reason));
            }
        }

        if run.log.has_messages() {
            self.report.show(REPORT_TITLE, REPORT_SUMMARY, &run.log.to_string());
        }
        Ok(run.into_outcome(backend.name()))
    }

    fn work(
        &self,
        slot: &mut AnalysisSlot<'_>,
        request: &LoadRequest,
        backend: &dyn DebugInfoBackend,
        settings: &LoadSettings,
        cancel: &CancelToken,
        run: &mut RunState,
    ) -> WorkerOutcome {
        let debug_file = request.debug_file.as_path();

        run.enter(PipelineState::Verifying);
        let expected = match slot.expected_identity() {
            Ok(expected) => expected,
            Err(e) => {
                run.log.append(format!("PDB Error: {e}"));
                return WorkerOutcome::Failed;
            }
        };
        let candidate = match backend.read_identity(debug_file) {
            Ok(candidate) => candidate,
            Err(e) => return run.backend_failure(e),
        };
        if let IdentityCheck::Mismatch(details) = identity::verify(expected.as_ref(), &candidate) {
            run.enter(PipelineState::AwaitingConfirmation);
            tracing::warn!(
                file = %debug_file.display(),
                candidate = %candidate.unique_id,
                age = candidate.age,
                "PDB identity mismatch"
            );
            if !self.confirm.ask_yes_no(CONFIRM_TITLE, &details.message()) {
                tracing::info!(file = %debug_file.display(), "operator declined mismatched PDB");
                return WorkerOutcome::Aborted;
            }
        }

        run.enter(PipelineState::Parsing);
        let RunState { trace, log, .. } = &mut *run;
        let result = backend.parse_and_apply(
            debug_file,
            slot,
            &settings.applicator,
            &settings.reader,
            cancel,
            log,
            &mut || enter_state(trace, PipelineState::Applying),
        );
        match result {
            Ok(applied) => {
                let cancelled = applied.cancelled;
                run.applied = Some(applied);
                if cancelled {
                    return run.cancelled_at(debug_file);
                }
            }
            Err(e) => return run.backend_failure(e),
        }

        run.enter(PipelineState::Demangling);
        match demangle::maybe_demangle(slot, cancel) {
            Ok(summary) => {
                let cancelled = summary.as_ref().is_some_and(|s| s.cancelled);
                run.demangled = summary;
                if cancelled {
                    return run.cancelled_at(debug_file);
                }
            }
            // Symbols are already committed; a failed post-pass does not fail the load.
            Err(e) => run.log.append(format!("PDB Error: demangling failed: {e}")),
        }
        WorkerOutcome::Completed
    }
}

/// Mutable bookkeeping threaded through one run.
#[derive(Debug)]
struct RunState {
    trace: Vec<PipelineState>,
    log: DiagnosticsLog,
    applied: Option<Applied>,
    demangled: Option<DemangleSummary>,
    cancelled: bool,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            trace: vec![PipelineState::Idle],
            log: DiagnosticsLog::new(),
            applied: None,
            demangled: None,
            cancelled: false,
        }
    }
}

impl RunState {
    fn enter(&mut self, state: PipelineState) {
        enter_state(&mut self.trace, state);
    }

    fn backend_failure(&mut self, err: BackendError) -> WorkerOutcome {
        match err {
            BackendError::Cancelled => {
                self.cancelled = true;
                self.log.append("PDB load cancelled; partial results were kept");
                WorkerOutcome::Cancelled
            }
            err if err.is_io() => {
                tracing::error!(error = %err, "PDB IO error");
                self.log.append(format!("PDB IO Error: {err}"));
                WorkerOutcome::Failed
            }
            err => {
                tracing::error!(error = %err, "PDB error");
                self.log.append(format!("PDB Error: {err}"));
                WorkerOutcome::Failed
            }
        }
    }

    fn cancelled_at(&mut self, debug_file: &std::path::Path) -> WorkerOutcome {
        self.cancelled = true;
        self.log.append(format!(
            "PDB load cancelled for {}; partial results were kept",
            debug_file.display()
        ));
        WorkerOutcome::Cancelled
    }

    fn into_outcome(self, backend: &str) -> PipelineOutcome {
        PipelineOutcome {
            state: self.trace.last().copied().unwrap_or(PipelineState::Idle),
            trace: self.trace,
            backend: backend.to_string(),
            applied: self.applied,
            demangled: self.demangled,
            cancelled: self.cancelled,
            messages: self.log.into_messages(),
        }
    }
}

fn enter_state(trace: &mut Vec<PipelineState>, state: PipelineState) {
    tracing::debug!(state = state.as_str(), "pipeline state");
    trace.push(state);
}

/// Best-effort history row, written while the slot is still held.
fn record_run(
    slot: &AnalysisSlot<'_>,
    request: &LoadRequest,
    backend: &dyn DebugInfoBackend,
    outcome: WorkerOutcome,
    message_count: usize,
    started_at: String,
) {
    let Some(status) = outcome.run_status() else {
        return;
    };
    let record = PdbLoadRunRecord {
        debug_file: request.debug_file.display().to_string(),
        debug_file_hash: request.debug_file_hash.clone(),
        backend: backend.name().to_string(),
        backend_version: backend.version(),
        status,
        message_count: message_count as u32,
        started_at,
        finished_at: Utc::now().to_rfc3339(),
    };
    if let Err(e) = slot.insert_load_run(&record) {
        tracing::warn!(error = %e, "failed to record PDB load run");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_when_section_is_missing() {
        let settings: LoadSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, LoadSettings::default());
        assert!(settings.record_runs);
        assert_eq!(settings.scheduler_options().acquire_timeout, None);
    }

    #[test]
    fn slot_timeout_maps_to_scheduler_options() {
        let settings: LoadSettings =
            serde_json::from_str(r#"{"backend": "legacy-interop", "slot_timeout_ms": 250}"#).unwrap();
        assert_eq!(settings.backend, BackendSelection::LegacyInterop);
        assert_eq!(
            settings.scheduler_options().acquire_timeout,
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn only_done_aborted_and_failed_are_terminal() {
        assert!(PipelineState::Done.is_terminal());
        assert!(PipelineState::Aborted.is_terminal());
        assert!(PipelineState::Failed.is_terminal());
        assert!(!PipelineState::Demangling.is_terminal());
    }
}
