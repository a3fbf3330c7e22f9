//! Shared test rig: a fully mocked instrument plus operation registry.
#![allow(dead_code)] // not every test binary touches every handle

use spim_acquisition::{AcquisitionEngine, Instrument, OperationRegistry};
use spim_core::Tile;
use spim_driver_mock::{
    MockCamera, MockChannelDevice, MockProcess, MockRoutine, MockStage, MockTransfer,
    MockTriggerDevice, MockWriter,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Handles to every mock in the rig, for assertions after a run.
pub struct RigHandles {
    pub cameras: Vec<Arc<MockCamera>>,
    pub writers: Vec<Arc<MockWriter>>,
    pub processes: Vec<Arc<MockProcess>>,
    pub tiling_stage: Arc<MockStage>,
    pub scanning_stage: Arc<MockStage>,
    pub daq: Arc<MockTriggerDevice>,
    pub transfers: Vec<Arc<MockTransfer>>,
    pub laser: Arc<MockChannelDevice>,
    pub routine: Arc<MockRoutine>,
    // Keeps writer output directories alive for the test's duration.
    #[allow(dead_code)]
    pub output_dir: TempDir,
}

pub struct RigBuilder {
    pub cameras: usize,
    pub chunk_count_px: u32,
    pub exposure: Duration,
    pub transfer_duration: Option<Duration>,
    pub with_process: bool,
}

impl Default for RigBuilder {
    fn default() -> Self {
        Self {
            cameras: 1,
            chunk_count_px: 4,
            exposure: Duration::ZERO,
            transfer_duration: None,
            with_process: false,
        }
    }
}

impl RigBuilder {
    pub fn build(self, tiles: Vec<Tile>) -> (AcquisitionEngine, RigHandles) {
        let output_dir = tempfile::tempdir().expect("tempdir");

        let tiling_stage = Arc::new(MockStage::new("x"));
        let scanning_stage = Arc::new(MockStage::new("z"));
        let daq = Arc::new(MockTriggerDevice::new());
        let laser = Arc::new(MockChannelDevice::new());
        let routine = Arc::new(MockRoutine::new());

        let mut builder = Instrument::builder()
            .tiling_stage("stage_x", tiling_stage.clone())
            .scanning_stage("stage_z", scanning_stage.clone())
            .daq("daq0", daq.clone())
            .channel_device("laser_488", "laser", laser.clone())
            .channel("488", vec!["laser_488".into()]);

        let mut registry = OperationRegistry::new();
        let mut cameras = Vec::new();
        let mut writers = Vec::new();
        let mut processes = Vec::new();
        let mut transfers = Vec::new();

        for index in 0..self.cameras {
            let camera_id = format!("cam{index}");
            let camera =
                Arc::new(MockCamera::new(32, 24).with_exposure(self.exposure));
            builder = builder.camera(&camera_id, camera.clone());
            cameras.push(camera);

            let writer = Arc::new(MockWriter::new(self.chunk_count_px, output_dir.path()));
            registry.add_writer(&camera_id, "stack_writer", writer.clone());
            writers.push(writer);

            if self.with_process {
                let process = Arc::new(MockProcess::new());
                registry.add_process(&camera_id, "max_projection", process.clone());
                processes.push(process);
            }

            if let Some(duration) = self.transfer_duration {
                let transfer = Arc::new(MockTransfer::new(duration));
                registry.add_transfer(&camera_id, "robocopy", transfer.clone());
                transfers.push(transfer);
            }
        }

        registry.add_routine("cam0", "background_collection", routine.clone());

        let instrument = Arc::new(builder.build());
        let engine = AcquisitionEngine::new(instrument, registry, spim_core::ScanPlan::new(tiles))
            .expect("engine construction");

        (
            engine,
            RigHandles {
                cameras,
                writers,
                processes,
                tiling_stage,
                scanning_stage,
                daq,
                transfers,
                laser,
                routine,
                output_dir,
            },
        )
    }
}

/// A tile on channel 488 at a small x offset per index.
pub fn tile(tile_number: usize, steps: u32) -> Tile {
    Tile {
        tile_number,
        channel: "488".into(),
        prefix: "brain".into(),
        position_mm: HashMap::from([
            ("x".into(), tile_number as f64 * 0.5),
            ("y".into(), 0.0),
            ("z".into(), 0.0),
        ]),
        steps,
        step_size_um: 1.0,
        device_settings: HashMap::new(),
    }
}
