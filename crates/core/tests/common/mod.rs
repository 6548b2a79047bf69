// Shared fixtures for the pipeline integration tests.
#![allow(dead_code)]

pub mod msf;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use symbridge_core::cancel::CancelToken;
use symbridge_core::db::{MemoryBlock, ProgramInfo};
use symbridge_core::identity::PdbIdentity;
use symbridge_core::model::{
    MemberRecord, ParsedDebugInfo, SymbolKind, SymbolRecord, SymbolScope, TypeKind, TypeRecord,
};
use symbridge_core::program::Program;
use symbridge_core::services::{BackendError, DebugInfoBackend, ReaderOptions};

pub const IMAGE_BASE: u64 = 0x1_4000_0000;
pub const GUID: &str = "3F2504E0-4F89-11D3-9A0C-0305E82C3301";
pub const MSVC_NAME: &str = "?world@@YA?AUhello@@XZ";

pub fn expected_identity() -> PdbIdentity {
    PdbIdentity::from_guid(GUID, 1).with_file("app.pdb")
}

pub fn program() -> Program {
    program_expecting(Some(expected_identity()))
}

pub fn program_expecting(identity: Option<PdbIdentity>) -> Program {
    let mut info = ProgramInfo::new("app.exe", IMAGE_BASE);
    if let Some(identity) = identity {
        info = info.with_expected_pdb(identity);
    }
    Program::in_memory(
        &info,
        &[
            MemoryBlock::new(".text", IMAGE_BASE + 0x1000, IMAGE_BASE + 0x8000),
            MemoryBlock::new(".data", IMAGE_BASE + 0x8000, IMAGE_BASE + 0x9000),
        ],
    )
    .expect("in-memory program")
}

pub fn symbol(name: &str, rva: u64, kind: SymbolKind, scope: SymbolScope) -> SymbolRecord {
    SymbolRecord { name: name.into(), rva, size: None, kind, scope }
}

/// Records that all land inside program memory.
pub fn parsed() -> ParsedDebugInfo {
    ParsedDebugInfo {
        types: vec![
            TypeRecord {
                name: "Point".into(),
                kind: TypeKind::Struct,
                size: 8,
                members: vec![
                    MemberRecord { name: "x".into(), offset: 0, type_name: "i32".into() },
                    MemberRecord { name: "y".into(), offset: 4, type_name: "i32".into() },
                ],
            },
            TypeRecord { name: "Color".into(), kind: TypeKind::Enum, size: 0, members: vec![
                MemberRecord { name: "Red".into(), offset: 0, type_name: String::new() },
            ] },
        ],
        symbols: vec![
            symbol(MSVC_NAME, 0x1000, SymbolKind::Function, SymbolScope::Public),
            symbol("main", 0x1100, SymbolKind::Function, SymbolScope::Public),
            symbol("g_counter", 0x8010, SymbolKind::Data, SymbolScope::Global),
        ],
        ..Default::default()
    }
}

#[derive(Debug, Clone)]
pub enum Failure {
    Malformed(String),
    Io,
}

/// In-memory backend returning canned data, instrumented to observe concurrency.
#[derive(Debug)]
pub struct FixtureBackend {
    pub identity: PdbIdentity,
    pub parsed: ParsedDebugInfo,
    pub failure: Option<Failure>,
    pub parse_delay: Duration,
    pub active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
    pub parse_calls: Arc<AtomicUsize>,
}

impl FixtureBackend {
    pub fn new(identity: PdbIdentity, parsed: ParsedDebugInfo) -> Self {
        Self {
            identity,
            parsed,
            failure: None,
            parse_delay: Duration::ZERO,
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
            parse_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn matching() -> Self {
        Self::new(expected_identity(), parsed())
    }

    pub fn failing(failure: Failure) -> Self {
        Self { failure: Some(failure), ..Self::matching() }
    }
}

impl DebugInfoBackend for FixtureBackend {
    fn name(&self) -> &'static str {
        "fixture"
    }

    fn read_identity(&self, _debug_file: &Path) -> Result<PdbIdentity, BackendError> {
        Ok(self.identity.clone())
    }

    fn parse(
        &self,
        debug_file: &Path,
        _options: &ReaderOptions,
        _cancel: &CancelToken,
    ) -> Result<ParsedDebugInfo, BackendError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.parse_calls.fetch_add(1, Ordering::SeqCst);
        if !self.parse_delay.is_zero() {
            thread::sleep(self.parse_delay);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        match &self.failure {
            Some(Failure::Malformed(reason)) => Err(BackendError::MalformedDebugFile(reason.clone())),
            Some(Failure::Io) => Err(BackendError::io(
                debug_file,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied"),
            )),
            None => Ok(self.parsed.clone()),
        }
    }
}

pub fn debug_file() -> PathBuf {
    PathBuf::from("app.pdb")
}
