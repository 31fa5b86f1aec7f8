//! Caller-supplied cancellation for long-running roster operations.

use crate::service::error::{RosterError, RosterResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag. Clones observe the same state.
///
/// Checked before each atomic batch; a batch that already committed is never
/// undone.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn check(&self, stage: &'static str) -> RosterResult<()> {
        if self.is_cancelled() {
            return Err(RosterError::Cancelled { stage });
        }
        Ok(())
    }
}
