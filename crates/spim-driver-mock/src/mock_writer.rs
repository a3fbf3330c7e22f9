//! Mock persistence writer draining chunk buffers out-of-band.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use spim_buffer::{SharedRegion, Signal};
use spim_core::{FrameWriter, StackSettings};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

/// Per-stack record of what the writer drained.
#[derive(Debug, Clone)]
pub struct StackRecord {
    pub filename: String,
    pub frame_count_px: u32,
    pub chunk_sizes: Vec<u32>,
}

impl StackRecord {
    pub fn frames_written(&self) -> u32 {
        self.chunk_sizes.iter().sum()
    }
}

/// Simulated compression writer.
///
/// `start` spawns a drain loop mirroring a real out-of-process writer: it
/// waits for `done_reading` to clear, maps the handed read region by name,
/// copies the chunk out, records its size and sets `done_reading` again.
/// Chunk sizes are derived from the configured stack length, so the final
/// chunk of an uneven tile is recorded at its remainder size.
pub struct MockWriter {
    chunk_count_px: u32,
    output_path: Option<PathBuf>,
    drain_delay: Duration,
    done_reading: Signal,
    stop_flag: Signal,
    read_region: Arc<Mutex<Option<String>>>,
    records: Arc<Mutex<Vec<StackRecord>>>,
    drain_task: TokioMutex<Option<JoinHandle<()>>>,
}

impl MockWriter {
    /// Writer persisting under `output_dir`.
    pub fn new(chunk_count_px: u32, output_dir: &Path) -> Self {
        Self {
            chunk_count_px,
            output_path: Some(output_dir.to_path_buf()),
            drain_delay: Duration::ZERO,
            // Nothing outstanding to drain at session start.
            done_reading: Signal::new(true),
            stop_flag: Signal::new(false),
            read_region: Arc::new(Mutex::new(None)),
            records: Arc::new(Mutex::new(Vec::new())),
            drain_task: TokioMutex::new(None),
        }
    }

    /// Writer with no destination path; it buffers but is never handed a
    /// read region.
    pub fn without_output(chunk_count_px: u32) -> Self {
        Self {
            output_path: None,
            ..Self::new(chunk_count_px, Path::new("."))
        }
    }

    /// Simulated compression latency per chunk.
    pub fn with_drain_delay(mut self, delay: Duration) -> Self {
        self.drain_delay = delay;
        self
    }

    /// All stacks configured so far, oldest first.
    pub fn stacks(&self) -> Vec<StackRecord> {
        self.records.lock().clone()
    }

    /// Chunk sizes drained for the most recent stack.
    pub fn chunk_sizes(&self) -> Vec<u32> {
        self.records
            .lock()
            .last()
            .map(|record| record.chunk_sizes.clone())
            .unwrap_or_default()
    }

    /// Total frames drained across every stack.
    pub fn frames_written(&self) -> u32 {
        self.records
            .lock()
            .iter()
            .map(StackRecord::frames_written)
            .sum()
    }
}

#[async_trait]
impl FrameWriter for MockWriter {
    fn chunk_count_px(&self) -> u32 {
        self.chunk_count_px
    }

    fn output_path(&self) -> Option<PathBuf> {
        self.output_path.clone()
    }

    async fn configure_stack(&self, settings: StackSettings) -> Result<()> {
        tracing::debug!(filename = %settings.filename, frames = settings.frame_count_px, "MockWriter: stack configured");
        self.records.lock().push(StackRecord {
            filename: settings.filename,
            frame_count_px: settings.frame_count_px,
            chunk_sizes: Vec::new(),
        });
        Ok(())
    }

    async fn prepare(&self) -> Result<()> {
        if let Some(path) = &self.output_path {
            std::fs::create_dir_all(path)?;
        }
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let done_reading = self.done_reading.clone();
        let stop_flag = self.stop_flag.clone();
        let read_region = self.read_region.clone();
        let records = self.records.clone();
        let chunk_count_px = self.chunk_count_px;
        let drain_delay = self.drain_delay;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = done_reading.wait_clear() => {
                        if !drain_delay.is_zero() {
                            sleep(drain_delay).await;
                        }
                        let region_name = read_region.lock().clone();
                        if let Some(name) = region_name {
                            match SharedRegion::open(&name) {
                                Ok(region) => {
                                    // Copy the chunk out as a stand-in for compression.
                                    let bytes = region.as_slice().to_vec();
                                    tracing::trace!(region = %name, bytes = bytes.len(), "MockWriter: drained chunk");
                                }
                                Err(e) => {
                                    tracing::warn!(region = %name, error = %e, "MockWriter: could not map read region");
                                }
                            }
                        }
                        {
                            let mut records = records.lock();
                            if let Some(record) = records.last_mut() {
                                let drained: u32 = record.chunk_sizes.iter().sum();
                                let remaining = record.frame_count_px.saturating_sub(drained);
                                record.chunk_sizes.push(remaining.min(chunk_count_px));
                            }
                        }
                        done_reading.set();
                    }
                    _ = stop_flag.wait_set() => break,
                }
            }
        });

        *self.drain_task.lock().await = Some(handle);
        Ok(())
    }

    fn done_reading(&self) -> Signal {
        self.done_reading.clone()
    }

    async fn set_read_region(&self, region_name: &str) -> Result<()> {
        *self.read_region.lock() = Some(region_name.to_string());
        Ok(())
    }

    async fn wait_to_finish(&self) -> Result<()> {
        // The last hand-off completes when done_reading goes high again.
        self.done_reading.wait_set().await;
        self.stop_flag.set();
        if let Some(handle) = self.drain_task.lock().await.take() {
            let _ = handle.await;
        }
        self.stop_flag.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spim_buffer::SharedDoubleBuffer;

    fn settings(frames: u32) -> StackSettings {
        StackSettings {
            row_count_px: 4,
            column_count_px: 4,
            frame_count_px: frames,
            position_mm: [0.0; 3],
            voxel_size_um: [0.748, 0.748, 1.0],
            filename: "stack".into(),
            channel: "488".into(),
        }
    }

    #[tokio::test]
    async fn drains_handed_chunks_and_signals_done() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MockWriter::new(2, dir.path());
        writer.configure_stack(settings(4)).await.unwrap();
        writer.prepare().await.unwrap();
        writer.start().await.unwrap();

        let frame_bytes = 4 * 4 * 2;
        let mut buffer = SharedDoubleBuffer::new(2, frame_bytes).unwrap();

        for _ in 0..2 {
            for _ in 0..2 {
                buffer.add_frame(&vec![1u8; frame_bytes]).unwrap();
            }
            buffer.toggle().unwrap();
            writer
                .set_read_region(buffer.read_region_name())
                .await
                .unwrap();
            writer.done_reading().clear();
            writer.done_reading().wait_set().await;
        }

        writer.wait_to_finish().await.unwrap();
        assert_eq!(writer.chunk_sizes(), vec![2, 2]);
        assert_eq!(writer.frames_written(), 4);
        buffer.close().unwrap();
    }

    #[tokio::test]
    async fn wait_to_finish_with_no_chunks_returns_immediately() {
        let writer = MockWriter::without_output(8);
        writer.configure_stack(settings(8)).await.unwrap();
        writer.start().await.unwrap();
        writer.wait_to_finish().await.unwrap();
        assert!(writer.chunk_sizes().is_empty());
        assert!(writer.output_path().is_none());
    }
}
