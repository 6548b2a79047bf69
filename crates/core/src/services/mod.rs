//! PDB ingestion services: parser backends, the applicator, the demangle post-pass and the
//! orchestrating pipeline.

pub mod applicator;
pub mod backends;
pub mod collaborators;
pub mod demangle;
pub mod pipeline;

pub use applicator::{Applicator, Applied};
pub use backends::{
    ApplicatorOptions, ApplicatorRestrictions, BackendError, BackendSelection, DebugInfoBackend,
    DiaDumpBackend, PdbReaderBackend, ReaderOptions, SelectedBackend,
};
pub use collaborators::{
    AutoConfirm, ConfirmationProvider, RecordingConfirmation, RecordingReportSink, Report,
    ReportSink,
};
pub use demangle::{maybe_demangle, DemangleSummary};
pub use pipeline::{
    LoadRequest, LoadSettings, PdbLoader, PipelineError, PipelineOutcome, PipelineState,
    WorkerOutcome,
};
