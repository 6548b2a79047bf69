use serde::{Deserialize, Serialize};

use crate::cancel::{CancelToken, Checkpoint};
use crate::db::{MemoryBlock, StoreTransaction, TypeInsert};
use crate::diagnostics::DiagnosticsLog;
use crate::model::{ParsedDebugInfo, RecordKind};
use crate::scheduler::AnalysisSlot;
use crate::services::backends::{ApplicatorOptions, BackendError};

/// Counters describing what one application changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applied {
    pub types_added: usize,
    /// Identical definitions (or placeholders) already present.
    pub types_existing: usize,
    pub symbols_added: usize,
    pub symbols_existing: usize,
    /// Symbols whose address falls outside every memory block.
    pub symbols_skipped: usize,
    pub lines_added: usize,
    pub comments_added: usize,
    /// Records dropped by applicator restrictions.
    pub records_filtered: usize,
    pub cancelled: bool,
}

impl Applied {
    pub fn records_added(&self) -> usize {
        self.types_added + self.symbols_added + self.lines_added + self.comments_added
    }
}

/// Merges parsed debug information into the program store.
///
/// Everything runs inside one store transaction: a type conflict rolls the whole application
/// back, while cancellation commits what was applied so far. Inserts are idempotent, so a
/// cancelled application can simply be re-run.
pub struct Applicator<'a> {
    options: &'a ApplicatorOptions,
}

impl<'a> Applicator<'a> {
    pub fn new(options: &'a ApplicatorOptions) -> Self {
        Self { options }
    }

    pub fn apply(
        &self,
        parsed: &ParsedDebugInfo,
        slot: &mut AnalysisSlot<'_>,
        image_base: u64,
        cancel: &CancelToken,
        log: &mut DiagnosticsLog,
    ) -> Result<Applied, BackendError> {
        let blocks = slot.memory_blocks()?;
        let restrictions = &self.options.restrictions;
        let mut checkpoint = Checkpoint::new(cancel, self.options.check_interval);
        let mut applied = Applied::default();
        let tx = slot.begin()?;

        if self.apply_records(parsed, &tx, &blocks, image_base, &mut checkpoint, &mut applied, log)? {
            applied.cancelled = true;
        }
        tx.commit()?;

        tracing::info!(
            types_added = applied.types_added,
            symbols_added = applied.symbols_added,
            symbols_skipped = applied.symbols_skipped,
            filtered = applied.records_filtered,
            cancelled = applied.cancelled,
            restricted = restrictions.allowed().count() < RecordKind::ALL.len(),
            "debug info applied"
        );
        Ok(applied)
    }

    /// Returns `true` when cancellation cut the application short.
    #[allow(clippy::too_many_arguments)]
    fn apply_records(
        &self,
        parsed: &ParsedDebugInfo,
        tx: &StoreTransaction<'_>,
        blocks: &[MemoryBlock],
        image_base: u64,
        checkpoint: &mut Checkpoint<'_>,
        applied: &mut Applied,
        log: &mut DiagnosticsLog,
    ) -> Result<bool, BackendError> {
        let restrictions = &self.options.restrictions;

        for record in &parsed.types {
            if !restrictions.allows(RecordKind::DataType) {
                applied.records_filtered += 1;
                continue;
            }
            if checkpoint.tick() {
                return Ok(true);
            }
            match tx.upsert_type(record)? {
                TypeInsert::Added | TypeInsert::Replaced => applied.types_added += 1,
                TypeInsert::Existing => applied.types_existing += 1,
                TypeInsert::Conflict { existing } => {
                    tracing::warn!(
                        name = %record.name,
                        existing_size = existing.size,
                        incoming_size = record.size,
                        "data type conflict"
                    );
                    return Err(BackendError::DuplicateTypeConflict { name: record.name.clone() });
                }
            }
        }

        for symbol in &parsed.symbols {
            if !restrictions.allows(symbol.scope.record_kind()) {
                applied.records_filtered += 1;
                continue;
            }
            if checkpoint.tick() {
                return Ok(true);
            }
            let Some(address) = place(image_base, symbol.rva, blocks) else {
                log.append(format!(
                    "Unable to place symbol {} at 0x{:X}: address is outside program memory",
                    symbol.name,
                    image_base.wrapping_add(symbol.rva)
                ));
                applied.symbols_skipped += 1;
                continue;
            };
            if tx.add_symbol(address, symbol)? {
                applied.symbols_added += 1;
            } else {
                applied.symbols_existing += 1;
            }
        }

        for line in &parsed.lines {
            if !restrictions.allows(RecordKind::LineNumber) {
                applied.records_filtered += 1;
                continue;
            }
            if checkpoint.tick() {
                return Ok(true);
            }
            if let Some(address) = place(image_base, line.rva, blocks) {
                if tx.add_line(address, &line.file, line.line)? {
                    applied.lines_added += 1;
                }
            }
        }

        for comment in &parsed.comments {
            if !restrictions.allows(RecordKind::Comment) {
                applied.records_filtered += 1;
                continue;
            }
            if checkpoint.tick() {
                return Ok(true);
            }
            if let Some(address) = place(image_base, comment.rva, blocks) {
                if tx.add_comment(address, &comment.text)? {
                    applied.comments_added += 1;
                }
            }
        }

        Ok(false)
    }
}

/// Absolute address of `rva`, if it lands inside a memory block.
fn place(image_base: u64, rva: u64, blocks: &[MemoryBlock]) -> Option<u64> {
    let address = image_base.checked_add(rva)?;
    blocks.iter().any(|block| block.contains(address)).then_some(address)
}
