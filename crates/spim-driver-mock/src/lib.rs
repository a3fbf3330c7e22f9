//! Mock collaborators for the spim acquisition engine.
//!
//! This crate provides simulated implementations of every capability trait
//! in `spim-core`, used by the integration tests and the demo binary. All
//! mocks use async-safe operations (`tokio::time::sleep`, never
//! `std::thread::sleep`) and expose introspection hooks the tests assert
//! against:
//!
//! - [`MockCamera`]: test-pattern frames with configurable exposure
//! - [`MockStage`]: instant or speed-limited motion, with a move counter
//! - [`MockTriggerDevice`]: records every trigger-protocol event in order
//! - [`MockWriter`]: drains chunk regions and records per-stack chunk sizes
//! - [`MockProcess`]: consumes slot frames and tracks a running mean
//! - [`MockTransfer`]: simulated background copy with start/finish records
//! - [`MockChannelDevice`]: laser/filter stand-in recording settings
//! - [`MockRoutine`]: pre-capture routine stand-in

pub mod mock_camera;
pub mod mock_channel;
pub mod mock_process;
pub mod mock_routine;
pub mod mock_stage;
pub mod mock_transfer;
pub mod mock_trigger;
pub mod mock_writer;
pub mod pattern;

pub use mock_camera::{MockCamera, MockCameraConfig};
pub use mock_channel::MockChannelDevice;
pub use mock_process::MockProcess;
pub use mock_routine::MockRoutine;
pub use mock_stage::MockStage;
pub use mock_transfer::{MockTransfer, TransferRecord};
pub use mock_trigger::{MockTriggerDevice, TriggerEvent};
pub use mock_writer::{MockWriter, StackRecord};
