//! Mock pre-capture routine.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use spim_core::Routine;
use std::sync::atomic::{AtomicU32, Ordering};

/// Simulated device routine recording its assigned filename and run count.
pub struct MockRoutine {
    filename: Mutex<Option<String>>,
    runs: AtomicU32,
}

impl MockRoutine {
    pub fn new() -> Self {
        Self {
            filename: Mutex::new(None),
            runs: AtomicU32::new(0),
        }
    }

    pub fn filename(&self) -> Option<String> {
        self.filename.lock().clone()
    }

    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }
}

impl Default for MockRoutine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Routine for MockRoutine {
    async fn set_filename(&self, filename: &str) -> Result<()> {
        *self.filename.lock() = Some(filename.to_string());
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let filename = self
            .filename
            .lock()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("MockRoutine: no filename set"))?;
        tracing::debug!(filename = %filename, "MockRoutine: running");
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
