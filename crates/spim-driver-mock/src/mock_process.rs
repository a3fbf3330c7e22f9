//! Mock analysis process consuming frames from a single-slot region.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use spim_buffer::{SharedRegion, Signal};
use spim_core::{FrameProcess, StackSettings};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;

/// Simulated live-analysis consumer.
///
/// Owns the "new image" signal: the capture loop publishes a frame into the
/// slot region and sets the signal; the consume loop copies the slot out,
/// updates a running mean and clears the signal so the next frame may land.
pub struct MockProcess {
    new_image: Signal,
    stop_flag: Signal,
    region_name: Arc<Mutex<Option<String>>>,
    frames_processed: Arc<AtomicU32>,
    last_mean: Arc<Mutex<f64>>,
    consume_task: TokioMutex<Option<JoinHandle<()>>>,
}

impl MockProcess {
    pub fn new() -> Self {
        Self {
            new_image: Signal::new(false),
            stop_flag: Signal::new(false),
            region_name: Arc::new(Mutex::new(None)),
            frames_processed: Arc::new(AtomicU32::new(0)),
            last_mean: Arc::new(Mutex::new(0.0)),
            consume_task: TokioMutex::new(None),
        }
    }

    pub fn frames_processed(&self) -> u32 {
        self.frames_processed.load(Ordering::SeqCst)
    }

    /// Mean pixel value of the most recently consumed frame.
    pub fn last_mean(&self) -> f64 {
        *self.last_mean.lock()
    }
}

impl Default for MockProcess {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameProcess for MockProcess {
    async fn configure_stack(&self, settings: StackSettings) -> Result<()> {
        tracing::debug!(filename = %settings.filename, "MockProcess: stack configured");
        Ok(())
    }

    async fn prepare(&self, region_name: &str) -> Result<()> {
        *self.region_name.lock() = Some(region_name.to_string());
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let new_image = self.new_image.clone();
        let stop_flag = self.stop_flag.clone();
        let region_name = self.region_name.clone();
        let frames_processed = self.frames_processed.clone();
        let last_mean = self.last_mean.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = new_image.wait_set() => {
                        let name = region_name.lock().clone();
                        if let Some(name) = name {
                            match SharedRegion::open(&name) {
                                Ok(region) => {
                                    let bytes = region.as_slice();
                                    let mut sum = 0u64;
                                    let mut count = 0u64;
                                    for px in bytes.chunks_exact(2) {
                                        sum += u16::from_le_bytes([px[0], px[1]]) as u64;
                                        count += 1;
                                    }
                                    if count > 0 {
                                        *last_mean.lock() = sum as f64 / count as f64;
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(region = %name, error = %e, "MockProcess: could not map slot region");
                                }
                            }
                        }
                        frames_processed.fetch_add(1, Ordering::SeqCst);
                        new_image.clear();
                    }
                    _ = stop_flag.wait_set() => break,
                }
            }
        });

        *self.consume_task.lock().await = Some(handle);
        Ok(())
    }

    fn new_image(&self) -> Signal {
        self.new_image.clone()
    }

    async fn wait_to_finish(&self) -> Result<()> {
        // Everything published has been consumed once the slot is clear.
        self.new_image.wait_clear().await;
        self.stop_flag.set();
        if let Some(handle) = self.consume_task.lock().await.take() {
            let _ = handle.await;
        }
        self.stop_flag.clear();
        Ok(())
    }
}
