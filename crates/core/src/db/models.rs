use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::identity::PdbIdentity;
use crate::model::{SymbolKind, SymbolScope, TypeRecord};

/// Program-level attributes recorded when the program was imported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgramInfo {
    /// Human-friendly name (e.g., "game.exe").
    pub name: String,
    /// Preferred load address; symbol RVAs are relocated against it.
    pub image_base: u64,
    /// PDB identity the executable's debug directory points at, if any.
    pub expected_pdb: Option<PdbIdentity>,
}

impl ProgramInfo {
    pub fn new(name: impl Into<String>, image_base: u64) -> Self {
        Self { name: name.into(), image_base, expected_pdb: None }
    }

    pub fn with_expected_pdb(mut self, identity: PdbIdentity) -> Self {
        self.expected_pdb = Some(identity);
        self
    }
}

/// A loaded address range of the program. `end` is exclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryBlock {
    pub name: String,
    pub start: u64,
    pub end: u64,
}

impl MemoryBlock {
    pub fn new(name: impl Into<String>, start: u64, end: u64) -> Self {
        Self { name: name.into(), start, end }
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address < self.end
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Key/value options of one category, as persisted in the program database.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgramOptions {
    pub category: String,
    pub values: BTreeMap<String, String>,
}

impl ProgramOptions {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Only a case-insensitive `"true"` reads as true; `default` applies when the key is unset.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(value) => value.trim().eq_ignore_ascii_case("true"),
            None => default,
        }
    }
}

/// A symbol row as stored in the program database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct SymbolRow {
    pub address: u64,
    pub name: String,
    pub kind: String,
    pub scope: String,
    pub size: Option<u64>,
    pub demangled: Option<String>,
}

impl SymbolRow {
    pub fn kind(&self) -> SymbolKind {
        SymbolKind::parse(&self.kind)
    }

    pub fn scope(&self) -> SymbolScope {
        if self.scope == "global" {
            SymbolScope::Global
        } else {
            SymbolScope::Public
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct CommentRow {
    pub address: u64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct LineRow {
    pub address: u64,
    pub file: String,
    pub line: u32,
}

/// Full contents of the type/symbol store, used to compare before/after states.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub types: Vec<TypeRecord>,
    pub symbols: Vec<SymbolRow>,
    pub comments: Vec<CommentRow>,
    pub lines: Vec<LineRow>,
}

impl StoreSnapshot {
    /// True when every row of `earlier` is still present here.
    pub fn is_superset_of(&self, earlier: &StoreSnapshot) -> bool {
        earlier.types.iter().all(|t| self.types.contains(t))
            && earlier
                .symbols
                .iter()
                .all(|s| self.symbols.iter().any(|o| o.address == s.address && o.name == s.name))
            && earlier.comments.iter().all(|c| self.comments.contains(c))
            && earlier.lines.iter().all(|l| self.lines.contains(l))
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
            && self.symbols.is_empty()
            && self.comments.is_empty()
            && self.lines.is_empty()
    }
}

/// Terminal status values persisted for PDB load runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PdbLoadStatus {
    Succeeded,
    Cancelled,
    Failed,
}

impl PdbLoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdbLoadStatus::Succeeded => "succeeded",
            PdbLoadStatus::Cancelled => "cancelled",
            PdbLoadStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for PdbLoadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "succeeded" => Ok(PdbLoadStatus::Succeeded),
            "cancelled" | "canceled" => Ok(PdbLoadStatus::Cancelled),
            "failed" => Ok(PdbLoadStatus::Failed),
            other => Err(format!("unknown PDB load status '{other}'")),
        }
    }
}

/// Bookkeeping row for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PdbLoadRunRecord {
    pub debug_file: String,
    pub debug_file_hash: Option<String>,
    pub backend: String,
    pub backend_version: Option<String>,
    pub status: PdbLoadStatus,
    pub message_count: u32,
    pub started_at: String,
    pub finished_at: String,
}
