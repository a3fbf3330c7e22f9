//! Capability traits for the acquisition engine's external collaborators.
//!
//! The engine never talks to hardware directly; it drives these narrow,
//! capability-typed contracts. Each trait:
//!
//! - is async (`#[async_trait]`)
//! - is thread-safe (`Send + Sync`, `&self` with interior mutability)
//! - uses `anyhow::Result` for errors
//! - covers one collaborator role
//!
//! Real drivers (PVCAM cameras, NI DAQ trigger lines, stage controllers) and
//! the simulated devices in `spim-driver-mock` implement the same traits.

use crate::data::Frame;
use anyhow::Result;
use async_trait::async_trait;
use spim_buffer::Signal;
use std::path::PathBuf;

/// Capability: frame source paced by hardware triggers.
///
/// # Contract
/// - `prepare()` then `start()` before the first `grab_frame()`
/// - `grab_frame()` blocks until the next exposure completes, bounded by the
///   driver's own timeout; a failed grab is surfaced, never retried here
/// - sensor geometry is fixed for the session
#[async_trait]
pub trait Camera: Send + Sync {
    fn width_px(&self) -> u32;

    fn height_px(&self) -> u32;

    fn bit_depth(&self) -> u32;

    async fn prepare(&self) -> Result<()>;

    async fn start(&self) -> Result<()>;

    /// Retrieve the next frame from the driver buffer.
    async fn grab_frame(&self) -> Result<Frame>;

    /// Report driver-side acquisition state (dropped frames, buffer fill).
    async fn signal_acquisition_state(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}

/// Capability: motion axis.
///
/// Positions are millimetres in instrument coordinates. `move_absolute_mm`
/// with `wait = false` initiates motion and returns; callers poll
/// `is_moving` to settle.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Instrument axis letter this stage drives ("x", "y", "z").
    fn instrument_axis(&self) -> &str;

    async fn move_absolute_mm(&self, position_mm: f64, wait: bool) -> Result<()>;

    async fn is_moving(&self) -> Result<bool>;

    async fn position_mm(&self) -> Result<f64>;
}

/// Capability: trigger/waveform generator group member (DAQ device).
///
/// A device may carry any combination of analog-waveform, digital-waveform
/// and counter (pulse-train) outputs. The pulse train is the acquisition
/// master clock: slaved waveform tasks must be generated, written and
/// started before `start_pulses`, and `stop` must complete before any
/// buffer toggle. The `TriggerSequencer` owns that ordering.
#[async_trait]
pub trait TriggerDevice: Send + Sync {
    fn has_waveform_output(&self) -> bool {
        false
    }

    fn has_digital_output(&self) -> bool {
        false
    }

    fn has_pulse_output(&self) -> bool {
        false
    }

    /// Compute per-channel waveforms for the tile about to be acquired.
    async fn generate_waveforms(&self, channel: &str) -> Result<()>;

    async fn write_ao_waveforms(&self) -> Result<()>;

    async fn write_do_waveforms(&self) -> Result<()>;

    /// Size the finite pulse train for the next burst.
    async fn configure_pulses(&self, pulse_count: u32) -> Result<()>;

    /// Arm and start the slaved waveform tasks.
    async fn start_waveforms(&self) -> Result<()>;

    /// Start the pulse train. Always called last in a trigger cycle.
    async fn start_pulses(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}

/// Per-stack geometry and metadata handed to writers and processes before a
/// tile is captured.
#[derive(Debug, Clone, PartialEq)]
pub struct StackSettings {
    pub row_count_px: u32,
    pub column_count_px: u32,
    pub frame_count_px: u32,
    /// Tile position in millimetres, instrument order x/y/z.
    pub position_mm: [f64; 3],
    /// Voxel size in micrometres, x/y/z.
    pub voxel_size_um: [f64; 3],
    pub filename: String,
    pub channel: String,
}

/// Capability: asynchronous compressed persistence consumer.
///
/// The writer drains chunk buffers out-of-band. The hand-off contract with
/// the capture loop:
///
/// 1. the loop toggles a filled buffer,
/// 2. writes the new read-region name via `set_read_region`,
/// 3. clears the writer's `done_reading` signal,
/// 4. the writer copies the chunk out and sets `done_reading` again.
///
/// The loop never toggles while `done_reading` is clear. A writer without an
/// output path participates in buffering but is never handed a region.
#[async_trait]
pub trait FrameWriter: Send + Sync {
    /// Frames per chunk this writer was configured with. Uniform across the
    /// session; validated once at startup.
    fn chunk_count_px(&self) -> u32;

    /// Destination path, if this writer persists data.
    fn output_path(&self) -> Option<PathBuf>;

    async fn configure_stack(&self, settings: StackSettings) -> Result<()>;

    async fn prepare(&self) -> Result<()>;

    async fn start(&self) -> Result<()>;

    /// Signal the writer sets once it has finished draining the read region.
    fn done_reading(&self) -> Signal;

    /// Hand the writer the shared region holding the next chunk. Written
    /// before `done_reading` is cleared.
    async fn set_read_region(&self, region_name: &str) -> Result<()>;

    /// Block until all outstanding chunks are written out.
    async fn wait_to_finish(&self) -> Result<()>;
}

/// Capability: live analysis consumer fed one frame at a time.
///
/// The process owns a "new image" signal; the capture loop publishes into
/// the process's slot region and sets the signal, and never overwrites the
/// slot before observing it cleared.
#[async_trait]
pub trait FrameProcess: Send + Sync {
    async fn configure_stack(&self, settings: StackSettings) -> Result<()>;

    /// Attach to the single-slot shared region by name.
    async fn prepare(&self, region_name: &str) -> Result<()>;

    async fn start(&self) -> Result<()>;

    /// Signal set by the capture loop when a fresh frame is in the slot and
    /// cleared by the process once consumed.
    fn new_image(&self) -> Signal;

    /// Block until the process has consumed everything outstanding.
    async fn wait_to_finish(&self) -> Result<()>;
}

/// Capability: background file transfer to long-term storage.
///
/// Transfers outlive the tile that produced their data; the orchestrator
/// blocks on a device's previous transfer before starting the next one so a
/// filename is never reused while still in flight.
#[async_trait]
pub trait Transfer: Send + Sync {
    async fn set_filename(&self, filename: &str) -> Result<()>;

    async fn start(&self) -> Result<()>;

    /// Non-blocking liveness check.
    fn is_alive(&self) -> bool;

    async fn wait_until_finished(&self) -> Result<()>;
}

/// Capability: pre-capture routine run against a device (autofocus sweeps,
/// background collection).
#[async_trait]
pub trait Routine: Send + Sync {
    async fn set_filename(&self, filename: &str) -> Result<()>;

    async fn start(&self) -> Result<()>;
}

/// Capability: channel-selecting device (laser, filter wheel).
#[async_trait]
pub trait ChannelDevice: Send + Sync {
    async fn enable(&self) -> Result<()>;

    async fn disable(&self) -> Result<()>;

    /// Apply a per-tile device setting (e.g. laser power).
    async fn apply_setting(&self, name: &str, value: &toml::Value) -> Result<()>;
}
