//! Binding between a debug file and the exact build it describes.
//!
//! A PDB is identified by a unique id (a GUID for PDB 7.0, a 32-bit signature for older
//! formats) plus an age counter bumped on every incremental link. The program records the
//! identity it expects (taken from the executable's CodeView debug directory); a candidate file
//! matches only when both parts are equal.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique id half of a PDB identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdbUniqueId {
    Guid(String),
    Signature(u32),
}

impl PdbUniqueId {
    /// GUIDs are compared case-insensitively and without surrounding braces.
    pub fn guid(value: &str) -> Self {
        let trimmed = value.trim().trim_start_matches('{').trim_end_matches('}');
        PdbUniqueId::Guid(trimmed.to_ascii_uppercase())
    }
}

impl fmt::Display for PdbUniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PdbUniqueId::Guid(guid) => write!(f, "GUID: {guid}"),
            PdbUniqueId::Signature(sig) => write!(f, "Signature: 0x{sig:08X}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdbIdentity {
    pub unique_id: PdbUniqueId,
    pub age: u32,
    /// File name or path, for display only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl PdbIdentity {
    pub fn from_guid(guid: &str, age: u32) -> Self {
        Self { unique_id: PdbUniqueId::guid(guid), age, file: None }
    }

    pub fn from_signature(signature: u32, age: u32) -> Self {
        Self { unique_id: PdbUniqueId::Signature(signature), age, file: None }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn matches(&self, other: &PdbIdentity) -> bool {
        self.unique_id == other.unique_id && self.age == other.age
    }

    /// Multi-line rendering used in confirmation prompts.
    pub fn describe(&self) -> String {
        format!(
            "PDB File: {}\n{}\nAge: {}\n",
            self.file.as_deref().unwrap_or("(unknown)"),
            self.unique_id,
            self.age
        )
    }
}

/// Result of comparing the program's expectation with a candidate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityCheck {
    Match,
    Mismatch(MismatchDetails),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MismatchDetails {
    pub expected: Option<PdbIdentity>,
    pub candidate: PdbIdentity,
}

// A line holding a single space; some prompt renderers collapse truly empty lines.
const BLANK_LINE: &str = " \n";

impl MismatchDetails {
    /// Operator-facing prompt naming both identities.
    pub fn message(&self) -> String {
        let mut out = String::new();
        out.push_str("Selected PDB does not match program's PDB specification!\n");
        out.push_str(BLANK_LINE);
        out.push_str("Program's PDB specification:\n");
        match &self.expected {
            Some(expected) => out.push_str(&expected.describe()),
            None => out.push_str("(no PDB information recorded for this program)\n"),
        }
        out.push_str(BLANK_LINE);
        out.push_str("Selected PDB file specification:\n");
        out.push_str(&self.candidate.describe());
        out.push_str(BLANK_LINE);
        out.push_str("Do you wish to force load this PDB?");
        out
    }
}

/// Compare identities. Pure; a program with no recorded expectation never matches.
pub fn verify(expected: Option<&PdbIdentity>, candidate: &PdbIdentity) -> IdentityCheck {
    match expected {
        Some(expected) if expected.matches(candidate) => IdentityCheck::Match,
        _ => IdentityCheck::Mismatch(MismatchDetails {
            expected: expected.cloned(),
            candidate: candidate.clone(),
        }),
    }
}
