//! Debug-info parser backends.
//!
//! Two incompatible implementations read the same kind of file: a legacy one that delegates to
//! an external DIA-style dump tool, and a self-contained reader built on the `pdb` crate. Both
//! produce a backend-neutral [`ParsedDebugInfo`] that the [`Applicator`] merges into the store.

pub mod dia_dump;
pub mod pdb_reader;

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::CancelToken;
use crate::db::DbError;
use crate::diagnostics::DiagnosticsLog;
use crate::identity::PdbIdentity;
use crate::model::{ParsedDebugInfo, RecordKind};
use crate::scheduler::AnalysisSlot;
use crate::services::applicator::{Applicator, Applied};

pub use dia_dump::DiaDumpBackend;
pub use pdb_reader::PdbReaderBackend;

/// Which parser backend a run uses. Chosen once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendSelection {
    /// External DIA-style dump tool.
    LegacyInterop,
    /// In-process MSF/PDB reader.
    #[default]
    UniversalReader,
}

impl BackendSelection {
    pub const ALL: [BackendSelection; 2] =
        [BackendSelection::LegacyInterop, BackendSelection::UniversalReader];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendSelection::LegacyInterop => "legacy-interop",
            BackendSelection::UniversalReader => "universal-reader",
        }
    }
}

impl fmt::Display for BackendSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy-interop" | "legacy" | "dia" => Ok(BackendSelection::LegacyInterop),
            "universal-reader" | "universal" | "pdb" => Ok(BackendSelection::UniversalReader),
            other => Err(format!(
                "unknown backend '{other}' (expected legacy-interop or universal-reader)"
            )),
        }
    }
}

/// Record categories the applicator is allowed to write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicatorRestrictions {
    allowed: BTreeSet<RecordKind>,
}

impl Default for ApplicatorRestrictions {
    fn default() -> Self {
        Self::none()
    }
}

impl ApplicatorRestrictions {
    /// No restriction: every record kind is applied.
    pub fn none() -> Self {
        Self::only(RecordKind::ALL)
    }

    pub fn data_types_only() -> Self {
        Self::only([RecordKind::DataType])
    }

    pub fn public_symbols_only() -> Self {
        Self::only([RecordKind::PublicSymbol])
    }

    pub fn exclude_all() -> Self {
        Self { allowed: BTreeSet::new() }
    }

    pub fn only(kinds: impl IntoIterator<Item = RecordKind>) -> Self {
        Self { allowed: kinds.into_iter().collect() }
    }

    pub fn allows(&self, kind: RecordKind) -> bool {
        self.allowed.contains(&kind)
    }

    pub fn allowed(&self) -> impl Iterator<Item = RecordKind> + '_ {
        self.allowed.iter().copied()
    }
}

impl FromStr for ApplicatorRestrictions {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::none()),
            "data-types-only" => Ok(Self::data_types_only()),
            "public-symbols-only" => Ok(Self::public_symbols_only()),
            "exclude-all" => Ok(Self::exclude_all()),
            other => Err(format!(
                "unknown restriction preset '{other}' \
                 (expected none, data-types-only, public-symbols-only or exclude-all)"
            )),
        }
    }
}

/// How parsed records are merged into the program store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicatorOptions {
    #[serde(default)]
    pub restrictions: ApplicatorRestrictions,
    /// Records applied between cancellation checks.
    #[serde(default = "default_check_interval")]
    pub check_interval: usize,
}

impl Default for ApplicatorOptions {
    fn default() -> Self {
        Self { restrictions: ApplicatorRestrictions::default(), check_interval: default_check_interval() }
    }
}

/// Knobs for the format readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderOptions {
    /// Records read between cancellation checks.
    #[serde(default = "default_check_interval")]
    pub check_interval: usize,
    /// Decode field lists into member layouts.
    #[serde(default = "default_true")]
    pub parse_members: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self { check_interval: default_check_interval(), parse_members: true }
    }
}

fn default_check_interval() -> usize {
    256
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Debug file not found at {0}")]
    MissingDebugFile(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed debug file: {0}")]
    MalformedDebugFile(String),
    #[error("Data type '{name}' conflicts with an existing definition")]
    DuplicateTypeConflict { name: String },
    #[error("Cancelled")]
    Cancelled,
    #[error("Debug info tool unavailable: {0}")]
    ToolUnavailable(String),
    #[error(transparent)]
    Store(#[from] DbError),
}

impl BackendError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        BackendError::Io { path: path.to_path_buf(), source }
    }

    pub fn is_io(&self) -> bool {
        matches!(self, BackendError::Io { .. } | BackendError::MissingDebugFile(_))
    }
}

/// Parser backend contract shared by every implementation.
pub trait DebugInfoBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Tool or library version, recorded in the run history.
    fn version(&self) -> Option<String> {
        None
    }

    /// Read only the identity header of `debug_file`.
    fn read_identity(&self, debug_file: &Path) -> Result<PdbIdentity, BackendError>;

    fn parse(
        &self,
        debug_file: &Path,
        options: &ReaderOptions,
        cancel: &CancelToken,
    ) -> Result<ParsedDebugInfo, BackendError>;

    /// Parse `debug_file` and merge the result into the program held by `slot`.
    ///
    /// `on_parsed` runs once parsing succeeded, before anything is written. Cancellation
    /// observed after parsing is reported through [`Applied::cancelled`], with whatever was
    /// applied up to that point committed.
    #[allow(clippy::too_many_arguments)]
    fn parse_and_apply(
        &self,
        debug_file: &Path,
        slot: &mut AnalysisSlot<'_>,
        applicator_options: &ApplicatorOptions,
        reader_options: &ReaderOptions,
        cancel: &CancelToken,
        log: &mut DiagnosticsLog,
        on_parsed: &mut dyn FnMut(),
    ) -> Result<Applied, BackendError> {
        let parsed = self.parse(debug_file, reader_options, cancel)?;
        on_parsed();
        let image_base = slot.image_base()?;
        Applicator::new(applicator_options).apply(&parsed, slot, image_base, cancel, log)
    }
}

/// The backend chosen for one run.
#[derive(Debug)]
pub enum SelectedBackend {
    LegacyInterop(DiaDumpBackend),
    UniversalReader(PdbReaderBackend),
}

impl SelectedBackend {
    pub fn new(selection: BackendSelection, dump_tool: Option<PathBuf>) -> Self {
        match selection {
            BackendSelection::LegacyInterop => {
                SelectedBackend::LegacyInterop(DiaDumpBackend::new(dump_tool))
            }
            BackendSelection::UniversalReader => {
                SelectedBackend::UniversalReader(PdbReaderBackend::new())
            }
        }
    }

    pub fn selection(&self) -> BackendSelection {
        match self {
            SelectedBackend::LegacyInterop(_) => BackendSelection::LegacyInterop,
            SelectedBackend::UniversalReader(_) => BackendSelection::UniversalReader,
        }
    }

    pub fn as_backend(&self) -> &dyn DebugInfoBackend {
        match self {
            SelectedBackend::LegacyInterop(backend) => backend,
            SelectedBackend::UniversalReader(backend) => backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restriction_presets_parse() {
        let all: ApplicatorRestrictions = "none".parse().unwrap();
        assert!(RecordKind::ALL.iter().all(|k| all.allows(*k)));

        let types: ApplicatorRestrictions = "data-types-only".parse().unwrap();
        assert!(types.allows(RecordKind::DataType));
        assert!(!types.allows(RecordKind::PublicSymbol));

        let nothing: ApplicatorRestrictions = "exclude-all".parse().unwrap();
        assert!(RecordKind::ALL.iter().all(|k| !nothing.allows(*k)));

        assert!("everything".parse::<ApplicatorRestrictions>().is_err());
    }

    #[test]
    fn restrictions_serialize_as_a_list() {
        let json = serde_json::to_string(&ApplicatorRestrictions::public_symbols_only()).unwrap();
        assert_eq!(json, r#"["public_symbol"]"#);
        let back: ApplicatorRestrictions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ApplicatorRestrictions::public_symbols_only());
    }

    #[test]
    fn backend_selection_round_trips_names() {
        for selection in BackendSelection::ALL {
            assert_eq!(selection.as_str().parse::<BackendSelection>().unwrap(), selection);
        }
        let json = serde_json::to_string(&BackendSelection::LegacyInterop).unwrap();
        assert_eq!(json, r#""legacy-interop""#);
    }

    #[test]
    fn selected_backend_reports_its_selection() {
        let backend = SelectedBackend::new(BackendSelection::LegacyInterop, None);
        assert_eq!(backend.selection(), BackendSelection::LegacyInterop);
        assert_eq!(backend.as_backend().name(), "legacy-interop");
    }
}
