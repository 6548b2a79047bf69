//! Demangling post-pass run once symbols have been applied.

use serde::{Deserialize, Serialize};

use crate::cancel::{CancelToken, Checkpoint};
use crate::db::DbResult;
use crate::scheduler::AnalysisSlot;

/// Option category holding analyzer toggles.
pub const ANALYSIS_OPTIONS_CATEGORY: &str = "Analyzers";
/// Option key enabling the post-pass; unset means enabled.
pub const DEMANGLER_OPTION: &str = "Demangler Microsoft";

const CHECK_INTERVAL: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemangleSummary {
    pub examined: usize,
    pub demangled: usize,
    /// Names that looked mangled but could not be decoded.
    pub failed: usize,
    pub cancelled: bool,
}

/// Read the persisted option gating the post-pass.
pub fn demangler_enabled(slot: &AnalysisSlot<'_>) -> DbResult<bool> {
    Ok(slot.options(ANALYSIS_OPTIONS_CATEGORY)?.get_bool(DEMANGLER_OPTION, true))
}

/// Decorate symbols inside program memory with demangled names.
///
/// Returns `None` when the option disables the pass. Cancellation keeps what was decorated so
/// far and is reported through [`DemangleSummary::cancelled`].
pub fn maybe_demangle(
    slot: &mut AnalysisSlot<'_>,
    cancel: &CancelToken,
) -> DbResult<Option<DemangleSummary>> {
    if !demangler_enabled(slot)? {
        tracing::debug!(program = slot.program().name(), "demangler disabled by option");
        return Ok(None);
    }

    let blocks = slot.memory_blocks()?;
    let mut summary = DemangleSummary::default();
    let mut checkpoint = Checkpoint::new(cancel, CHECK_INTERVAL);
    let tx = slot.begin()?;

    'blocks: for block in &blocks {
        for (id, name) in tx.symbols_pending_demangle(block.start, block.end)? {
            if checkpoint.tick() {
                summary.cancelled = true;
                break 'blocks;
            }
            summary.examined += 1;
            match demangle(&name) {
                Some(demangled) => {
                    tx.set_demangled(id, &demangled)?;
                    summary.demangled += 1;
                }
                None if looks_mangled(&name) => {
                    tracing::debug!(symbol = %name, "unable to demangle");
                    summary.failed += 1;
                }
                None => {}
            }
        }
    }
    tx.commit()?;

    tracing::info!(
        examined = summary.examined,
        demangled = summary.demangled,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "demangle pass finished"
    );
    Ok(Some(summary))
}

/// Demangle an MSVC or Rust symbol name. Returns `None` for plain or undecodable names.
pub fn demangle(name: &str) -> Option<String> {
    if is_msvc_mangled(name) {
        demangle_msvc(name)
    } else if is_rust_mangled(name) {
        demangle_rust(name)
    } else {
        None
    }
}

fn looks_mangled(name: &str) -> bool {
    is_msvc_mangled(name) || is_rust_mangled(name)
}

/// MSVC decorated names start with `?`.
fn is_msvc_mangled(name: &str) -> bool {
    name.starts_with('?')
}

fn is_rust_mangled(name: &str) -> bool {
    name.starts_with("_R") || name.starts_with("_ZN")
}

fn demangle_msvc(name: &str) -> Option<String> {
    msvc_demangler::demangle(name, msvc_demangler::DemangleFlags::llvm()).ok()
}

fn demangle_rust(name: &str) -> Option<String> {
    // `{:#}` drops the trailing hash.
    rustc_demangle::try_demangle(name).ok().map(|sym| format!("{sym:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msvc_names_are_demangled() {
        let demangled = demangle("?world@@YA?AUhello@@XZ").unwrap();
        assert!(demangled.contains("world"), "{demangled}");
        assert!(demangled.contains("hello"), "{demangled}");
    }

    #[test]
    fn rust_names_drop_the_hash() {
        let demangled = demangle("_ZN4core3fmt5write17h0123456789abcdefE").unwrap();
        assert_eq!(demangled, "core::fmt::write");
    }

    #[test]
    fn plain_names_are_left_alone() {
        assert_eq!(demangle("main"), None);
        assert!(!looks_mangled("WinMain"));
    }
}
