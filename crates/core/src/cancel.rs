use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag threaded through every pipeline stage.
///
/// Clones share the same flag, so a frontend can hold one clone and cancel a run that is
/// executing on another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Counts processed records and reports when the next cancellation check is due.
#[derive(Debug)]
pub(crate) struct Checkpoint<'a> {
    token: &'a CancelToken,
    interval: usize,
    seen: usize,
}

impl<'a> Checkpoint<'a> {
    pub(crate) fn new(token: &'a CancelToken, interval: usize) -> Self {
        Self { token, interval: interval.max(1), seen: 0 }
    }

    /// Record one unit of work; returns `true` once cancellation has been observed.
    pub(crate) fn tick(&mut self) -> bool {
        self.seen += 1;
        self.seen % self.interval == 0 && self.token.is_cancelled()
    }
}
