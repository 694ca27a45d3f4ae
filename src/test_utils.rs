//! Shared test doubles used by unit modules and the `tests/` suites.

use crate::error::{LightsOutError, Result};
use crate::scheduler::ShutdownExecutor;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// [`ShutdownExecutor`] that counts calls instead of touching the OS.
#[derive(Debug, Default)]
pub struct RecordingShutdown {
    executed: AtomicUsize,
    cancelled: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingShutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor whose shutdown command always fails.
    pub fn failing() -> Self {
        let executor = Self::default();
        executor.fail.store(true, Ordering::SeqCst);
        executor
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShutdownExecutor for RecordingShutdown {
    async fn execute_shutdown(&self) -> Result<()> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(LightsOutError::Shutdown("permission denied".into()));
        }
        Ok(())
    }

    async fn cancel_shutdown(&self) -> Result<()> {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
