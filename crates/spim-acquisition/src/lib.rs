//! `spim-acquisition`
//!
//! The acquisition engine: per-tile orchestration and per-camera frame
//! capture for a tiled, multi-channel volumetric dataset whose exposures are
//! paced by hardware trigger pulses.
//!
//! # Control flow
//!
//! [`AcquisitionEngine::run`] iterates the scan plan. For each tile it
//! positions the tiling stages, readies the scanning stages, configures the
//! imaging channel, writes trigger waveforms, runs pre-routines, then spawns
//! one capture task per camera and joins them all before stopping the
//! trigger hardware and reconciling background transfers.
//!
//! Each capture task walks the state machine
//! Idle → Armed → Capturing → ChunkBoundary → Draining → Stopped: frames are
//! pulled from the camera and appended into double-buffered shared chunk
//! stores; at every chunk boundary the trigger sequencer is stopped, the
//! buffers toggle once their consumer has drained the previous chunk, and
//! the writer is handed the new read region. Cancellation is cooperative via
//! [`CancelToken`] and observed only at defined suspension points.

pub mod cancel;
pub mod capture;
pub mod engine;
pub mod instrument;
pub mod registry;
pub mod sequencer;

pub use cancel::CancelToken;
pub use capture::ChunkLayout;
pub use engine::{AcquisitionEngine, RunOutcome};
pub use instrument::{Instrument, InstrumentBuilder};
pub use registry::{OperationKind, OperationRegistry};
pub use sequencer::TriggerSequencer;
