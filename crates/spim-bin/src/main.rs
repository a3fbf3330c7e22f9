//! Headless entry point: run a fully simulated tiled acquisition.
//!
//! All devices are mocks, so this binary exercises the whole engine
//! (stage settling, channel setup, trigger bursts, chunked double-buffered
//! capture, writer drains and background transfers) without hardware:
//!
//! ```bash
//! RUST_LOG=info spim --config scan.toml
//! ```
//!
//! Configuration merges built-in defaults, an optional TOML file and
//! `SPIM_*` environment variables.

use anyhow::Result;
use clap::Parser;
use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use spim_acquisition::{AcquisitionEngine, Instrument, OperationRegistry};
use spim_core::plan::{ScanPlan, Tile};
use spim_driver_mock::{
    MockCamera, MockCameraConfig, MockChannelDevice, MockProcess, MockStage, MockTransfer,
    MockTriggerDevice, MockWriter,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "spim", about = "Tiled volumetric acquisition engine (simulated devices)")]
struct Cli {
    /// TOML scan configuration; built-in defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SimConfig {
    /// Frames per chunk for every writer in the session.
    chunk_count_px: u32,

    /// Where the simulated writers place their output.
    output_dir: PathBuf,

    /// Simulated transfer duration in milliseconds.
    transfer_ms: u64,

    camera: CameraSection,

    tiles: Vec<Tile>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CameraSection {
    width: u32,
    height: u32,
    exposure_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        let tiles = (0..2)
            .map(|index| Tile {
                tile_number: index,
                channel: "488".into(),
                prefix: "demo".into(),
                position_mm: HashMap::from([
                    ("x".into(), index as f64 * 0.5),
                    ("y".into(), 0.0),
                    ("z".into(), 0.0),
                ]),
                steps: 16,
                step_size_um: 1.0,
                device_settings: HashMap::new(),
            })
            .collect();

        Self {
            chunk_count_px: 8,
            output_dir: std::env::temp_dir().join("spim-demo"),
            transfer_ms: 50,
            camera: CameraSection {
                width: 256,
                height: 256,
                exposure_ms: 1,
            },
            tiles,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut figment = Figment::from(Serialized::defaults(SimConfig::default()));
    if let Some(path) = &cli.config {
        figment = figment.merge(Toml::file(path));
    }
    let config: SimConfig = figment
        .merge(figment::providers::Env::prefixed("SPIM_"))
        .extract()?;

    info!(
        tiles = config.tiles.len(),
        chunk_count_px = config.chunk_count_px,
        "starting simulated acquisition"
    );

    let camera = Arc::new(MockCamera::with_config(MockCameraConfig {
        width: config.camera.width,
        height: config.camera.height,
        exposure_ms: config.camera.exposure_ms,
    }));
    let laser = Arc::new(MockChannelDevice::new());
    let daq = Arc::new(MockTriggerDevice::new());

    let instrument = Arc::new(
        Instrument::builder()
            .camera("cam0", camera.clone())
            .tiling_stage("stage_x", Arc::new(MockStage::new("x")))
            .tiling_stage("stage_y", Arc::new(MockStage::new("y")))
            .scanning_stage("stage_z", Arc::new(MockStage::new("z")))
            .daq("daq0", daq)
            .channel_device("laser_488", "laser", laser)
            .channel("488", vec!["laser_488".into()])
            .build(),
    );

    let writer = Arc::new(MockWriter::new(config.chunk_count_px, &config.output_dir));
    let process = Arc::new(MockProcess::new());
    let transfer = Arc::new(MockTransfer::new(Duration::from_millis(config.transfer_ms)));

    let mut operations = OperationRegistry::new();
    operations.add_writer("cam0", "stack_writer", writer.clone());
    operations.add_process("cam0", "max_projection", process.clone());
    operations.add_transfer("cam0", "archive", transfer.clone());

    let engine = AcquisitionEngine::new(instrument, operations, ScanPlan::new(config.tiles))?;
    let outcome = engine.run().await?;

    for stack in writer.stacks() {
        info!(
            filename = %stack.filename,
            chunks = ?stack.chunk_sizes,
            frames = stack.frames_written(),
            "stack written"
        );
    }
    info!(
        ?outcome,
        frames_grabbed = camera.frames_grabbed(),
        frames_processed = process.frames_processed(),
        transfers = transfer.records().len(),
        "acquisition finished"
    );
    Ok(())
}
