//! Mock background file transfer.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use spim_core::Transfer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

/// Start/finish record of one simulated transfer.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub filename: String,
    pub started: Instant,
    pub finished: Instant,
}

/// Simulated transfer thread copying a tile's output to long-term storage.
///
/// `start` refuses to run while a previous transfer is still alive: the
/// orchestrator must wait on it first. The interval log lets tests prove
/// that per-device transfers never overlap.
pub struct MockTransfer {
    duration: Duration,
    filename: Arc<Mutex<Option<String>>>,
    alive: Arc<AtomicBool>,
    handle: TokioMutex<Option<JoinHandle<()>>>,
    log: Arc<Mutex<Vec<TransferRecord>>>,
}

impl MockTransfer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            filename: Arc::new(Mutex::new(None)),
            alive: Arc::new(AtomicBool::new(false)),
            handle: TokioMutex::new(None),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Completed transfers, oldest first.
    pub fn records(&self) -> Vec<TransferRecord> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl Transfer for MockTransfer {
    async fn set_filename(&self, filename: &str) -> Result<()> {
        *self.filename.lock() = Some(filename.to_string());
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let filename = self
            .filename
            .lock()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("MockTransfer: no filename set"))?;
        if self.alive.load(Ordering::SeqCst) {
            anyhow::bail!("MockTransfer: previous transfer for '{filename}' still running");
        }

        self.alive.store(true, Ordering::SeqCst);
        let alive = self.alive.clone();
        let log = self.log.clone();
        let duration = self.duration;

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            sleep(duration).await;
            log.lock().push(TransferRecord {
                filename,
                started,
                finished: Instant::now(),
            });
            alive.store(false, Ordering::SeqCst);
        });
        *self.handle.lock().await = Some(handle);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn wait_until_finished(&self) -> Result<()> {
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_and_records_interval() {
        let transfer = MockTransfer::new(Duration::from_millis(20));
        transfer.set_filename("tile_0").await.unwrap();
        transfer.start().await.unwrap();
        assert!(transfer.is_alive());

        transfer.wait_until_finished().await.unwrap();
        assert!(!transfer.is_alive());

        let records = transfer.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].filename, "tile_0");
        assert!(records[0].finished >= records[0].started);
    }

    #[tokio::test]
    async fn overlapping_start_is_rejected() {
        let transfer = MockTransfer::new(Duration::from_millis(50));
        transfer.set_filename("tile_0").await.unwrap();
        transfer.start().await.unwrap();
        assert!(transfer.start().await.is_err());
        transfer.wait_until_finished().await.unwrap();

        transfer.set_filename("tile_1").await.unwrap();
        transfer.start().await.unwrap();
        transfer.wait_until_finished().await.unwrap();
        assert_eq!(transfer.records().len(), 2);
    }

    #[tokio::test]
    async fn start_without_filename_fails() {
        let transfer = MockTransfer::new(Duration::ZERO);
        assert!(transfer.start().await.is_err());
    }
}
