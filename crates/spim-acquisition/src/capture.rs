//! Per-camera frame capture loop.

use crate::cancel::CancelToken;
use crate::sequencer::TriggerSequencer;
use anyhow::Result;
use parking_lot::Mutex;
use spim_buffer::{FrameSlot, SharedDoubleBuffer, Signal};
use spim_core::{Camera, Frame, FrameProcess, FrameWriter, StackSettings, Tile};
use std::sync::Arc;
use tracing::{debug, info};

/// Voxel footprint of one camera pixel in the sample plane.
const XY_VOXEL_SIZE_UM: f64 = 0.748;

/// Capture state machine, one per camera task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureState {
    Idle,
    Armed,
    Capturing,
    ChunkBoundary,
    Draining,
    Stopped,
}

/// Chunk arithmetic for one tile.
///
/// A tile of `steps` frames is dispatched as `ceil(steps / chunk_count_px)`
/// chunks; only the last chunk may be smaller than the chunk size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    steps: u32,
    chunk_count_px: u32,
}

impl ChunkLayout {
    pub fn new(steps: u32, chunk_count_px: u32) -> Self {
        debug_assert!(chunk_count_px > 0);
        Self {
            steps,
            chunk_count_px,
        }
    }

    /// Number of chunks this tile dispatches.
    pub fn chunk_count(&self) -> u32 {
        self.steps.div_ceil(self.chunk_count_px)
    }

    /// Frame count of the final chunk: the remainder, or the full chunk
    /// size when the tile divides evenly.
    pub fn last_chunk_size(&self) -> u32 {
        match self.steps % self.chunk_count_px {
            0 => self.chunk_count_px,
            remainder => remainder,
        }
    }

    /// Pulse count for the chunk at `chunk_index`.
    pub fn pulses_for_chunk(&self, chunk_index: u32) -> u32 {
        if chunk_index + 1 == self.chunk_count() {
            self.last_chunk_size()
        } else {
            self.chunk_count_px
        }
    }
}

/// One writer consumer with its double buffer.
///
/// The toggle lock is held only for the toggle itself, never during fill,
/// so a consumer mapping the read region never observes a half-swapped
/// buffer.
struct WriterLane {
    name: String,
    writer: Arc<dyn FrameWriter>,
    drained: Signal,
    buffer: SharedDoubleBuffer,
    toggle_lock: Mutex<()>,
}

/// One analysis consumer with its single-slot region.
struct ProcessLane {
    name: String,
    process: Arc<dyn FrameProcess>,
    new_image: Signal,
    slot: FrameSlot,
}

/// Everything one camera's capture task needs for one tile.
pub(crate) struct CaptureTask {
    pub camera_id: String,
    pub camera: Arc<dyn Camera>,
    pub writers: Vec<(String, Arc<dyn FrameWriter>)>,
    pub processes: Vec<(String, Arc<dyn FrameProcess>)>,
    pub sequencer: Arc<TriggerSequencer>,
    pub chunk_count_px: u32,
    pub tile: Tile,
    pub filename: String,
    pub cancel: CancelToken,
}

impl CaptureTask {
    /// Run the capture loop for one tile.
    ///
    /// Idle → Armed: configure and start camera, writers and processes.
    /// Armed → Capturing: the frame loop below.
    /// → Draining: always, on completion, cancellation and error alike, so
    /// consumers finish and shared memory is released exactly once.
    pub(crate) async fn run(self) -> Result<()> {
        let mut state = CaptureState::Idle;
        debug!(camera = %self.camera_id, ?state, "capture task starting");

        let frame_bytes = Frame::expected_len(
            self.camera.width_px(),
            self.camera.height_px(),
            self.camera.bit_depth(),
        );

        let mut lanes = Vec::with_capacity(self.writers.len());
        for (name, writer) in &self.writers {
            writer.configure_stack(self.stack_settings()).await?;
            lanes.push(WriterLane {
                name: name.clone(),
                writer: writer.clone(),
                drained: writer.done_reading(),
                buffer: SharedDoubleBuffer::new(self.chunk_count_px, frame_bytes)?,
                toggle_lock: Mutex::new(()),
            });
        }

        let mut slots = Vec::with_capacity(self.processes.len());
        for (name, process) in &self.processes {
            process.configure_stack(self.stack_settings()).await?;
            let slot = FrameSlot::new(frame_bytes, process.new_image())?;
            process.prepare(slot.region_name()).await?;
            slots.push(ProcessLane {
                name: name.clone(),
                process: process.clone(),
                new_image: process.new_image(),
                slot,
            });
        }

        self.camera.prepare().await?;
        for lane in &lanes {
            lane.writer.prepare().await?;
            lane.writer.start().await?;
        }
        self.camera.start().await?;
        for lane in &slots {
            lane.process.start().await?;
        }

        state = CaptureState::Armed;
        info!(
            camera = %self.camera_id,
            ?state,
            writers = lanes.len(),
            processes = slots.len(),
            steps = self.tile.steps,
            "camera armed"
        );

        state = CaptureState::Capturing;
        let capture_result = self.capture_frames(&mut state, &mut lanes, &mut slots).await;

        state = CaptureState::Draining;
        debug!(camera = %self.camera_id, ?state, "draining consumers");
        let drain_result = self.drain(&mut lanes, &mut slots).await;

        state = CaptureState::Stopped;
        debug!(camera = %self.camera_id, ?state, "capture task finished");

        match (capture_result, drain_result) {
            (Err(e), _) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    /// The frame loop. Frames arrive serialized in trigger order.
    async fn capture_frames(
        &self,
        state: &mut CaptureState,
        lanes: &mut [WriterLane],
        slots: &mut [ProcessLane],
    ) -> Result<()> {
        let layout = ChunkLayout::new(self.tile.steps, self.chunk_count_px);
        let last_index = self.tile.steps.saturating_sub(1);

        'frames: for stack_index in 0..self.tile.steps {
            if self.cancel.is_cancelled() {
                info!(camera = %self.camera_id, frame = stack_index, "stop requested, leaving capture loop");
                break 'frames;
            }

            let chunk_index = stack_index % self.chunk_count_px;
            if chunk_index == 0 {
                // Start a batch of pulses to generate more frames and movements.
                let pulses = layout.pulses_for_chunk(stack_index / self.chunk_count_px);
                debug!(camera = %self.camera_id, pulses, "arming trigger burst");
                self.sequencer.begin_burst(pulses).await?;
            }

            let frame = self.camera.grab_frame().await?;
            self.camera.signal_acquisition_state().await?;

            for lane in lanes.iter_mut() {
                lane.buffer.add_frame(&frame.data)?;
            }

            // Dispatch either a full chunk or the final, possibly smaller one.
            if chunk_index + 1 == self.chunk_count_px || stack_index == last_index {
                *state = CaptureState::ChunkBoundary;
                // No trigger may fire while a buffer transition is in progress.
                self.sequencer.stop().await?;

                for lane in lanes.iter_mut() {
                    tokio::select! {
                        _ = lane.drained.wait_set() => {}
                        _ = self.cancel.cancelled() => {
                            info!(camera = %self.camera_id, writer = %lane.name, "stop requested while waiting for drain");
                            break 'frames;
                        }
                    }
                    {
                        let _guard = lane.toggle_lock.lock();
                        lane.buffer.toggle()?;
                    }
                    // The writer learns the read region before its drain
                    // signal is cleared.
                    if lane.writer.output_path().is_some() {
                        lane.writer
                            .set_read_region(lane.buffer.read_region_name())
                            .await?;
                        lane.drained.clear();
                    }
                }
                *state = CaptureState::Capturing;
            }

            // Offer the frame to each analysis process. The slot is a
            // bounded one-slot queue: wait until the previous frame was
            // consumed before overwriting it.
            for lane in slots.iter_mut() {
                tokio::select! {
                    _ = lane.new_image.wait_clear() => {
                        lane.slot.publish(&frame.data)?;
                    }
                    _ = self.cancel.cancelled() => {
                        info!(camera = %self.camera_id, process = %lane.name, "stop requested while waiting for slot");
                        break 'frames;
                    }
                }
            }
        }
        Ok(())
    }

    /// Finish consumers, stop the camera and release shared memory exactly
    /// once. Errors are collected so every release step still runs.
    async fn drain(&self, lanes: &mut [WriterLane], slots: &mut [ProcessLane]) -> Result<()> {
        let mut first_err: Option<anyhow::Error> = None;
        let mut record = |err: anyhow::Error| {
            if first_err.is_none() {
                first_err = Some(err);
            } else {
                tracing::warn!(camera = %self.camera_id, error = %err, "additional drain error");
            }
        };

        // Error and cancel paths may leave a burst running.
        if let Err(e) = self.sequencer.stop().await {
            record(e);
        }

        for lane in lanes.iter() {
            debug!(camera = %self.camera_id, writer = %lane.name, "waiting for writer to finish");
            if let Err(e) = lane.writer.wait_to_finish().await {
                record(e);
            }
        }
        for lane in slots.iter() {
            debug!(camera = %self.camera_id, process = %lane.name, "waiting for process to finish");
            if let Err(e) = lane.process.wait_to_finish().await {
                record(e);
            }
        }

        if let Err(e) = self.camera.stop().await {
            record(e);
        }

        debug!(camera = %self.camera_id, "deallocating shared buffers");
        for lane in lanes.iter_mut() {
            if let Err(e) = lane.buffer.close() {
                record(e.into());
            }
        }
        for lane in slots.iter_mut() {
            if let Err(e) = lane.slot.close() {
                record(e.into());
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn stack_settings(&self) -> StackSettings {
        StackSettings {
            row_count_px: self.camera.height_px(),
            column_count_px: self.camera.width_px(),
            frame_count_px: self.tile.steps,
            position_mm: [
                self.tile.position_on("x"),
                self.tile.position_on("y"),
                self.tile.position_on("z"),
            ],
            voxel_size_um: [XY_VOXEL_SIZE_UM, XY_VOXEL_SIZE_UM, self.tile.step_size_um],
            filename: self.filename.clone(),
            channel: self.tile.channel.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uneven_tile_has_remainder_last_chunk() {
        let layout = ChunkLayout::new(10, 4);
        assert_eq!(layout.chunk_count(), 3);
        assert_eq!(layout.last_chunk_size(), 2);
        assert_eq!(layout.pulses_for_chunk(0), 4);
        assert_eq!(layout.pulses_for_chunk(1), 4);
        assert_eq!(layout.pulses_for_chunk(2), 2);
    }

    #[test]
    fn even_tile_uses_full_chunks_throughout() {
        let layout = ChunkLayout::new(8, 4);
        assert_eq!(layout.chunk_count(), 2);
        assert_eq!(layout.last_chunk_size(), 4);
        assert_eq!(layout.pulses_for_chunk(1), 4);
    }

    #[test]
    fn single_chunk_tile() {
        let layout = ChunkLayout::new(4, 4);
        assert_eq!(layout.chunk_count(), 1);
        assert_eq!(layout.pulses_for_chunk(0), 4);
    }

    #[test]
    fn frame_totals_match_steps() {
        for (steps, chunk) in [(10u32, 4u32), (64, 8), (9, 2), (100, 33)] {
            let layout = ChunkLayout::new(steps, chunk);
            let total: u32 = (0..layout.chunk_count())
                .map(|i| layout.pulses_for_chunk(i))
                .sum();
            assert_eq!(total, steps, "steps={steps} chunk={chunk}");
        }
    }
}
