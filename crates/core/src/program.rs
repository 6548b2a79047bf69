use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::db::{DbResult, ProgramDb, ProgramInfo};

/// Handle to a program under analysis.
///
/// The program database sits behind the analysis slot. Mutating access is handed out only by
/// [`crate::scheduler::AnalysisScheduler`]; observers may take a read view, which waits while
/// an analysis unit of work holds the slot.
#[derive(Debug)]
pub struct Program {
    name: String,
    store: Mutex<ProgramDb>,
}

impl Program {
    pub fn new(name: impl Into<String>, db: ProgramDb) -> Self {
        Self { name: name.into(), store: Mutex::new(db) }
    }

    /// Open an in-memory program initialized with `info` and `blocks`.
    pub fn in_memory(info: &ProgramInfo, blocks: &[crate::db::MemoryBlock]) -> DbResult<Self> {
        let mut db = ProgramDb::open_in_memory()?;
        db.initialize_program(info, blocks)?;
        Ok(Self::new(info.name.clone(), db))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` against a read view of the program database.
    pub fn read<R>(&self, f: impl FnOnce(&ProgramDb) -> R) -> R {
        let guard = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub(crate) fn try_lock_store(
        &self,
    ) -> Result<MutexGuard<'_, ProgramDb>, std::sync::TryLockError<MutexGuard<'_, ProgramDb>>> {
        self.store.try_lock()
    }

    /// Consume the handle, returning the program database.
    pub fn into_db(self) -> ProgramDb {
        self.store.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
