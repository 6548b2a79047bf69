//! Per-program analysis slot.
//!
//! At most one unit of work may mutate a program's type/symbol store at a time. The scheduler
//! grants that right as an [`AnalysisSlot`], a scoped guard released on drop, so every exit
//! path of a unit of work (normal, cancelled, failed, aborted, panicking) gives it back exactly
//! once.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::cancel::CancelToken;
use crate::db::ProgramDb;
use crate::program::Program;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Analysis scheduler unavailable: {0}")]
    Unavailable(String),
    #[error("Cancelled while waiting for the analysis slot")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// `None` waits until the slot is free.
    pub acquire_timeout: Option<Duration>,
    pub poll_interval: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self { acquire_timeout: None, poll_interval: Duration::from_millis(5) }
    }
}

/// Grants exclusive analysis access to programs.
#[derive(Debug, Default)]
pub struct AnalysisScheduler {
    options: SchedulerOptions,
    shut_down: AtomicBool,
}

impl AnalysisScheduler {
    pub fn new(options: SchedulerOptions) -> Self {
        Self { options, shut_down: AtomicBool::new(false) }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Stop granting slots. Units of work already holding a slot run to completion.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Run `work` while holding the analysis slot of `program`.
    ///
    /// Blocks until the slot is free (or the configured timeout elapses). The slot is released
    /// when `work` returns or unwinds.
    pub fn schedule_exclusive<R>(
        &self,
        program: &Program,
        worker_name: &str,
        cancel: &CancelToken,
        work: impl FnOnce(&mut AnalysisSlot<'_>) -> R,
    ) -> Result<R, SchedulerError> {
        let mut slot = self.acquire(program, worker_name, cancel)?;
        Ok(work(&mut slot))
    }

    fn acquire<'p>(
        &self,
        program: &'p Program,
        worker_name: &str,
        cancel: &CancelToken,
    ) -> Result<AnalysisSlot<'p>, SchedulerError> {
        let started = Instant::now();
        let mut waited = false;
        loop {
            if self.is_shut_down() {
                return Err(SchedulerError::Unavailable("scheduler has been shut down".into()));
            }
            match program.try_lock_store() {
                Ok(guard) => {
                    tracing::debug!(
                        program = program.name(),
                        worker = worker_name,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "acquired analysis slot"
                    );
                    return Ok(AnalysisSlot {
                        guard,
                        program,
                        worker: worker_name.to_string(),
                        acquired_at: Instant::now(),
                    });
                }
                Err(TryLockError::Poisoned(_)) => {
                    return Err(SchedulerError::Unavailable(format!(
                        "analysis slot for '{}' was poisoned by a failed worker",
                        program.name()
                    )));
                }
                Err(TryLockError::WouldBlock) => {}
            }
            if !waited {
                tracing::debug!(program = program.name(), worker = worker_name, "waiting for analysis slot");
                waited = true;
            }
            if cancel.is_cancelled() {
                return Err(SchedulerError::Cancelled);
            }
            if let Some(timeout) = self.options.acquire_timeout {
                if started.elapsed() >= timeout {
                    return Err(SchedulerError::Unavailable(format!(
                        "timed out after {}ms waiting for the analysis slot of '{}'",
                        timeout.as_millis(),
                        program.name()
                    )));
                }
            }
            thread::sleep(self.options.poll_interval);
        }
    }
}

/// Exclusive write access to one program's store for the lifetime of a unit of work.
pub struct AnalysisSlot<'p> {
    guard: MutexGuard<'p, ProgramDb>,
    program: &'p Program,
    worker: String,
    acquired_at: Instant,
}

impl AnalysisSlot<'_> {
    pub fn program(&self) -> &Program {
        self.program
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }
}

impl Deref for AnalysisSlot<'_> {
    type Target = ProgramDb;

    fn deref(&self) -> &ProgramDb {
        &self.guard
    }
}

impl DerefMut for AnalysisSlot<'_> {
    fn deref_mut(&mut self) -> &mut ProgramDb {
        &mut self.guard
    }
}

impl Drop for AnalysisSlot<'_> {
    fn drop(&mut self) {
        tracing::debug!(
            program = self.program.name(),
            worker = %self.worker,
            held_ms = self.acquired_at.elapsed().as_millis() as u64,
            "released analysis slot"
        );
    }
}
