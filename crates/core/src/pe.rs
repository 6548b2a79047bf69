//! Import program attributes from a PE executable.
//!
//! Reads the preferred image base, the section map and the CodeView debug directory that names
//! the PDB the linker produced alongside the executable.

use std::path::{Path, PathBuf};

use goblin::pe::debug::CodeviewPDB70DebugInfo;
use goblin::pe::section_table::SectionTable;
use goblin::pe::PE;
use thiserror::Error;

use crate::db::{MemoryBlock, ProgramInfo};
use crate::identity::PdbIdentity;

#[derive(Debug, Error)]
pub enum PeError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Not a PE image: {0}")]
    Parse(#[from] goblin::error::Error),
}

/// Attributes recovered from an executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeImport {
    pub info: ProgramInfo,
    pub blocks: Vec<MemoryBlock>,
}

pub fn import_program(path: &Path) -> Result<PeImport, PeError> {
    let bytes = std::fs::read(path)
        .map_err(|source| PeError::Io { path: path.to_path_buf(), source })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    import_bytes(&name, &bytes)
}

pub fn import_bytes(name: &str, bytes: &[u8]) -> Result<PeImport, PeError> {
    let pe = PE::parse(bytes)?;
    let image_base = pe.image_base as u64;

    let blocks = pe
        .sections
        .iter()
        .filter_map(|section| section_block(image_base, section))
        .filter(|block| !block.is_empty())
        .collect();

    let mut info = ProgramInfo::new(name, image_base);
    let codeview = pe.debug_data.as_ref().and_then(|debug| debug.codeview_pdb70_debug_info.as_ref());
    if let Some(pdb70) = codeview {
        info = info.with_expected_pdb(codeview_identity(pdb70));
    }
    Ok(PeImport { info, blocks })
}

/// Map a section header to absolute addresses. Sections whose range overflows are skipped.
fn section_block(image_base: u64, section: &SectionTable) -> Option<MemoryBlock> {
    let size = if section.virtual_size == 0 { section.size_of_raw_data } else { section.virtual_size };
    let name = section.name().map(str::to_string).unwrap_or_else(|_| "section".into());
    let range = image_base
        .checked_add(u64::from(section.virtual_address))
        .and_then(|start| Some((start, start.checked_add(u64::from(size))?)));
    match range {
        Some((start, end)) => Some(MemoryBlock::new(name, start, end)),
        None => {
            tracing::warn!(
                section = %name,
                image_base,
                virtual_address = section.virtual_address,
                "section range overflows the address space; skipped"
            );
            None
        }
    }
}

fn codeview_identity(pdb70: &CodeviewPDB70DebugInfo<'_>) -> PdbIdentity {
    let identity = PdbIdentity::from_guid(&format_guid(&pdb70.signature), pdb70.age);
    with_filename(identity, pdb70.filename)
}

fn with_filename(identity: PdbIdentity, raw: &[u8]) -> PdbIdentity {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    let file = String::from_utf8_lossy(&raw[..end]).to_string();
    if file.is_empty() {
        identity
    } else {
        identity.with_file(file)
    }
}

/// Render a CodeView GUID; the first three fields are stored little-endian.
fn format_guid(bytes: &[u8; 16]) -> String {
    let data1 = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let data2 = u16::from_le_bytes([bytes[4], bytes[5]]);
    let data3 = u16::from_le_bytes([bytes[6], bytes[7]]);
    format!(
        "{data1:08X}-{data2:04X}-{data3:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
        bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]
    )
}
