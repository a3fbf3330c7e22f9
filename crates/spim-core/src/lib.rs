//! `spim-core`
//!
//! Core types and capability traits for the tiled volumetric acquisition
//! engine. The engine itself lives in `spim-acquisition`; this crate defines
//! the contracts it drives:
//!
//! - [`capabilities`]: small async traits for the external collaborators
//!   (camera, stage, trigger device, writer, analysis process, transfer,
//!   routine, channel device). Devices implement only what they support.
//! - [`data`]: the raw [`Frame`] type shared between camera and consumers.
//! - [`plan`]: the scan plan, an ordered list of [`Tile`] records.
//! - [`error`]: typed configuration/invariant errors raised before any
//!   hardware is armed.
//!
//! Collaborator methods return `anyhow::Result`; hardware failures propagate
//! out of the capture loop without automatic retry.

pub mod capabilities;
pub mod data;
pub mod error;
pub mod plan;

pub use capabilities::{
    Camera, ChannelDevice, FrameProcess, FrameWriter, Routine, Stage, StackSettings, Transfer,
    TriggerDevice,
};
pub use data::Frame;
pub use error::{EngineError, EngineResult};
pub use plan::{ScanPlan, Tile};
