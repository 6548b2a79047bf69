use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;

use crate::cancel::CancelToken;
use crate::identity::PdbIdentity;
use crate::model::ParsedDebugInfo;
use crate::services::backends::{BackendError, DebugInfoBackend, ReaderOptions};

/// Environment variable naming the dump tool when settings do not.
pub const DUMP_TOOL_ENV: &str = "SYMBRIDGE_PDB_DUMP";
/// Environment variable pointing at a pre-dumped JSON document used instead of the tool.
pub const FAKE_DUMP_ENV: &str = "SYMBRIDGE_FAKE_PDB_DUMP";

const DEFAULT_DUMP_TOOL: &str = "pdb-dump";

/// Legacy backend that shells out to a DIA-style dump tool.
///
/// The tool understands three invocations:
/// - `<tool> --version`
/// - `<tool> --identity <pdb>` printing `{"guid"|"signature", "age", "file"}`
/// - `<tool> --dump <pdb>` printing the whole document (`identity`, `types`, `symbols`,
///   `lines`, `comments`)
#[derive(Debug, Clone, Default)]
pub struct DiaDumpBackend {
    tool: Option<PathBuf>,
    dump_override: Option<PathBuf>,
}

impl DiaDumpBackend {
    pub fn new(tool: Option<PathBuf>) -> Self {
        Self { tool, dump_override: None }
    }

    /// Read a pre-dumped document instead of spawning the tool.
    pub fn with_dump_file(mut self, dump: impl Into<PathBuf>) -> Self {
        self.dump_override = Some(dump.into());
        self
    }

    /// Resolved tool path: settings, then `SYMBRIDGE_PDB_DUMP`, then `pdb-dump` on `PATH`.
    pub fn tool_path(&self) -> PathBuf {
        self.tool.clone().unwrap_or_else(resolve_dump_tool)
    }

    fn dump_source(&self) -> Option<PathBuf> {
        self.dump_override.clone().or_else(|| std::env::var_os(FAKE_DUMP_ENV).map(PathBuf::from))
    }

    fn load_document(&self, debug_file: &Path) -> Result<DumpDocument, BackendError> {
        let body = match self.dump_source() {
            Some(dump) => fs::read_to_string(&dump).map_err(|e| BackendError::io(&dump, e))?,
            None => run_tool(&self.tool_path(), "--dump", debug_file)?,
        };
        parse_document(&body)
    }
}

impl DebugInfoBackend for DiaDumpBackend {
    fn name(&self) -> &'static str {
        "legacy-interop"
    }

    fn version(&self) -> Option<String> {
        if self.dump_source().is_some() {
            return Some("pre-dumped".to_string());
        }
        version_string(&self.tool_path()).ok()
    }

    fn read_identity(&self, debug_file: &Path) -> Result<PdbIdentity, BackendError> {
        ensure_debug_file(debug_file)?;
        let raw = match self.dump_source() {
            Some(_) => self.load_document(debug_file)?.identity,
            None => {
                let body = run_tool(&self.tool_path(), "--identity", debug_file)?;
                serde_json::from_str::<DumpIdentity>(&body).map_err(|e| {
                    BackendError::MalformedDebugFile(format!("failed to parse dump identity: {e}"))
                })?
            }
        };
        raw.into_identity(debug_file)
    }

    fn parse(
        &self,
        debug_file: &Path,
        options: &ReaderOptions,
        cancel: &CancelToken,
    ) -> Result<ParsedDebugInfo, BackendError> {
        ensure_debug_file(debug_file)?;
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        let mut document = self.load_document(debug_file)?;
        if !options.parse_members {
            for record in &mut document.info.types {
                record.members.clear();
            }
        }
        tracing::debug!(
            records = document.info.record_count(),
            file = %debug_file.display(),
            "dump tool document loaded"
        );
        Ok(document.info)
    }
}

fn ensure_debug_file(debug_file: &Path) -> Result<(), BackendError> {
    if debug_file.is_file() {
        Ok(())
    } else {
        Err(BackendError::MissingDebugFile(debug_file.to_path_buf()))
    }
}

fn resolve_dump_tool() -> PathBuf {
    std::env::var_os(DUMP_TOOL_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DUMP_TOOL))
}

fn run_tool(tool: &Path, mode: &str, debug_file: &Path) -> Result<String, BackendError> {
    let output = Command::new(tool).arg(mode).arg(debug_file).output().map_err(|e| {
        BackendError::ToolUnavailable(format!("failed to spawn {}: {e}", tool.display()))
    })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BackendError::MalformedDebugFile(format!(
            "{} {mode} exited with {}: {}",
            tool.display(),
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn version_string(tool: &Path) -> Result<String, String> {
    let output = Command::new(tool)
        .arg("--version")
        .output()
        .map_err(|e| format!("failed to spawn {}: {e}", tool.display()))?;
    if !output.status.success() {
        return Err(format!("{} --version exited with {}", tool.display(), output.status));
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        Err(format!("{} --version produced no output", tool.display()))
    } else {
        Ok(stdout)
    }
}

fn parse_document(body: &str) -> Result<DumpDocument, BackendError> {
    serde_json::from_str(body).map_err(|e| {
        BackendError::MalformedDebugFile(format!("failed to parse dump tool JSON: {e}"))
    })
}

#[derive(Debug, Deserialize)]
struct DumpDocument {
    identity: DumpIdentity,
    #[serde(flatten)]
    info: ParsedDebugInfo,
}

#[derive(Debug, Deserialize)]
struct DumpIdentity {
    #[serde(default)]
    guid: Option<String>,
    #[serde(default)]
    signature: Option<u32>,
    age: u32,
    #[serde(default)]
    file: Option<String>,
}

impl DumpIdentity {
    fn into_identity(self, debug_file: &Path) -> Result<PdbIdentity, BackendError> {
        let identity = match (self.guid, self.signature) {
            (Some(guid), _) => PdbIdentity::from_guid(&guid, self.age),
            (None, Some(signature)) => PdbIdentity::from_signature(signature, self.age),
            (None, None) => {
                return Err(BackendError::MalformedDebugFile(
                    "dump identity carries neither a GUID nor a signature".to_string(),
                ))
            }
        };
        let file = self.file.unwrap_or_else(|| debug_file.display().to_string());
        Ok(identity.with_file(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PdbUniqueId;
    use crate::model::{SymbolKind, TypeKind};

    const DOC: &str = r#"{
        "identity": {"guid": "{3f2504e0-4f89-11d3-9a0c-0305e82c3301}", "age": 2},
        "types": [{"name": "Point", "kind": "struct", "size": 8,
                   "members": [{"name": "x", "offset": 0, "type_name": "int"},
                               {"name": "y", "offset": 4, "type_name": "int"}]}],
        "symbols": [{"name": "main", "rva": 4096, "kind": "function"}],
        "lines": [{"rva": 4096, "file": "main.c", "line": 3}],
        "comments": []
    }"#;

    fn fixture() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let pdb = dir.path().join("app.pdb");
        fs::write(&pdb, b"placeholder").unwrap();
        let dump = dir.path().join("app.json");
        fs::write(&dump, DOC).unwrap();
        (dir, pdb, dump)
    }

    #[test]
    fn reads_identity_from_dump_document() {
        let (_dir, pdb, dump) = fixture();
        let backend = DiaDumpBackend::new(None).with_dump_file(&dump);
        let identity = backend.read_identity(&pdb).unwrap();
        assert_eq!(
            identity.unique_id,
            PdbUniqueId::Guid("3F2504E0-4F89-11D3-9A0C-0305E82C3301".into())
        );
        assert_eq!(identity.age, 2);
        assert_eq!(identity.file.as_deref(), Some(pdb.display().to_string().as_str()));
    }

    #[test]
    fn parses_records_from_dump_document() {
        let (_dir, pdb, dump) = fixture();
        let backend = DiaDumpBackend::new(None).with_dump_file(&dump);
        let parsed = backend.parse(&pdb, &ReaderOptions::default(), &CancelToken::new()).unwrap();
        assert_eq!(parsed.types[0].kind, TypeKind::Struct);
        assert_eq!(parsed.types[0].members.len(), 2);
        assert_eq!(parsed.symbols[0].kind, SymbolKind::Function);
        assert_eq!(parsed.lines.len(), 1);
    }

    #[test]
    fn missing_debug_file_is_reported() {
        let (dir, _pdb, dump) = fixture();
        let backend = DiaDumpBackend::new(None).with_dump_file(&dump);
        let err = backend.read_identity(&dir.path().join("nope.pdb")).unwrap_err();
        assert!(matches!(err, BackendError::MissingDebugFile(_)));
    }

    #[test]
    fn garbage_document_is_malformed() {
        let (dir, pdb, _dump) = fixture();
        let bad = dir.path().join("bad.json");
        fs::write(&bad, "not json").unwrap();
        let backend = DiaDumpBackend::new(None).with_dump_file(&bad);
        let err = backend.parse(&pdb, &ReaderOptions::default(), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, BackendError::MalformedDebugFile(_)));
    }

    #[test]
    fn unspawnable_tool_is_unavailable() {
        let (dir, pdb, _dump) = fixture();
        let backend = DiaDumpBackend::new(Some(dir.path().join("no-such-tool")));
        let err = backend.read_identity(&pdb).unwrap_err();
        assert!(matches!(err, BackendError::ToolUnavailable(_)));
    }
}
