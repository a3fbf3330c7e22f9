//! End-to-end acquisition behavior against a fully mocked instrument.

mod common;

use common::{tile, RigBuilder};
use spim_core::EngineError;
use spim_driver_mock::TriggerEvent;
use std::collections::HashMap;
use std::time::Duration;

#[tokio::test]
async fn uneven_tile_dispatches_remainder_chunk() {
    let (engine, rig) = RigBuilder {
        chunk_count_px: 4,
        with_process: true,
        ..Default::default()
    }
    .build(vec![tile(0, 10)]);

    let outcome = engine.run().await.unwrap();
    assert_eq!(outcome, spim_acquisition::RunOutcome::Completed);

    // ceil(10 / 4) chunks, remainder only on the last one.
    assert_eq!(rig.writers[0].chunk_sizes(), vec![4, 4, 2]);
    assert_eq!(rig.writers[0].frames_written(), 10);

    // Pulse counts mirror the chunk layout.
    let pulses: Vec<u32> = rig
        .daq
        .events()
        .iter()
        .filter_map(|event| match event {
            TriggerEvent::PulsesConfigured(count) => Some(*count),
            _ => None,
        })
        .collect();
    assert_eq!(pulses, vec![4, 4, 2]);

    // Every frame was offered to the analysis process.
    assert_eq!(rig.processes[0].frames_processed(), 10);
    assert!(rig.processes[0].last_mean() > 0.0);

    // Channel setup and routines ran.
    assert!(rig.laser.is_enabled());
    assert_eq!(rig.routine.runs(), 1);
    assert_eq!(
        rig.routine.filename().as_deref(),
        Some("brain_0_ch_488_camera_cam0_background_collection")
    );

    // The camera was stopped during drain.
    assert!(!rig.cameras[0].is_started());
    assert_eq!(rig.cameras[0].frames_grabbed(), 10);
}

#[tokio::test]
async fn evenly_divisible_tile_uses_full_chunks() {
    let (engine, rig) = RigBuilder {
        chunk_count_px: 4,
        ..Default::default()
    }
    .build(vec![tile(0, 8)]);

    engine.run().await.unwrap();
    assert_eq!(rig.writers[0].chunk_sizes(), vec![4, 4]);
}

#[tokio::test]
async fn trigger_protocol_orders_master_clock_last_and_stops_before_toggle() {
    let (engine, rig) = RigBuilder {
        chunk_count_px: 4,
        ..Default::default()
    }
    .build(vec![tile(0, 8)]);

    engine.run().await.unwrap();

    // One waveform write per tile, then per chunk: configure, arm slaved
    // tasks, start the master clock last, stop before the buffer toggle.
    assert_eq!(
        rig.daq.events(),
        vec![
            TriggerEvent::WaveformsGenerated("488".into()),
            TriggerEvent::AoWritten,
            TriggerEvent::DoWritten,
            TriggerEvent::PulsesConfigured(4),
            TriggerEvent::WaveformsStarted,
            TriggerEvent::PulsesStarted,
            TriggerEvent::Stopped,
            TriggerEvent::PulsesConfigured(4),
            TriggerEvent::WaveformsStarted,
            TriggerEvent::PulsesStarted,
            TriggerEvent::Stopped,
        ]
    );
}

#[tokio::test]
async fn multiple_cameras_capture_concurrently() {
    let (engine, rig) = RigBuilder {
        cameras: 2,
        chunk_count_px: 4,
        ..Default::default()
    }
    .build(vec![tile(0, 10)]);

    engine.run().await.unwrap();

    for writer in &rig.writers {
        assert_eq!(writer.chunk_sizes(), vec![4, 4, 2]);
    }
    for camera in &rig.cameras {
        assert_eq!(camera.frames_grabbed(), 10);
    }
}

#[tokio::test]
async fn multi_tile_run_records_one_stack_per_tile() {
    let (engine, rig) = RigBuilder {
        chunk_count_px: 4,
        ..Default::default()
    }
    .build(vec![tile(0, 8), tile(1, 10)]);

    engine.run().await.unwrap();

    let stacks = rig.writers[0].stacks();
    assert_eq!(stacks.len(), 2);
    assert_eq!(stacks[0].chunk_sizes, vec![4, 4]);
    assert_eq!(stacks[1].chunk_sizes, vec![4, 4, 2]);
    assert_eq!(stacks[0].filename, "brain_0_ch_488_camera_cam0");
    assert_eq!(stacks[1].filename, "brain_1_ch_488_camera_cam0");
}

#[tokio::test]
async fn tile_device_settings_are_applied_during_channel_setup() {
    let mut t = tile(0, 4);
    t.device_settings.insert(
        "laser_488".into(),
        HashMap::from([("power_mw".into(), toml::Value::Float(10.0))]),
    );
    let (engine, rig) = RigBuilder {
        chunk_count_px: 4,
        ..Default::default()
    }
    .build(vec![t]);

    engine.run().await.unwrap();

    assert_eq!(rig.laser.enable_count(), 1);
    assert_eq!(
        rig.laser.applied_settings().get("power_mw"),
        Some(&toml::Value::Float(10.0))
    );
}

#[tokio::test]
async fn short_tile_is_rejected_before_any_motion_or_spawn() {
    use spim_acquisition::{AcquisitionEngine, Instrument, OperationRegistry};
    use spim_core::ScanPlan;
    use spim_driver_mock::{MockCamera, MockStage, MockTriggerDevice, MockWriter};
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let stage = Arc::new(MockStage::new("x"));
    let daq = Arc::new(MockTriggerDevice::new());
    let camera = Arc::new(MockCamera::new(16, 16));

    let instrument = Arc::new(
        Instrument::builder()
            .camera("cam0", camera.clone())
            .tiling_stage("stage_x", stage.clone())
            .daq("daq0", daq.clone())
            .channel("488", vec![])
            .build(),
    );
    let mut registry = OperationRegistry::new();
    registry.add_writer("cam0", "zarr", Arc::new(MockWriter::new(4, dir.path())));

    let err = AcquisitionEngine::new(instrument, registry, ScanPlan::new(vec![tile(0, 2)]))
        .err()
        .unwrap();
    assert!(matches!(
        err,
        EngineError::TileTooShort {
            tile: 0,
            steps: 2,
            chunk_count_px: 4
        }
    ));

    // Nothing moved, nothing triggered, nothing captured.
    assert_eq!(stage.move_count(), 0);
    assert!(daq.events().is_empty());
    assert_eq!(camera.frames_grabbed(), 0);
}

#[tokio::test]
async fn writer_without_output_path_toggles_but_gets_no_chunks() {
    use spim_acquisition::{AcquisitionEngine, Instrument, OperationRegistry};
    use spim_core::ScanPlan;
    use spim_driver_mock::{MockCamera, MockStage, MockTriggerDevice, MockWriter};
    use std::sync::Arc;

    let camera = Arc::new(MockCamera::new(16, 16));
    let writer = Arc::new(MockWriter::without_output(4));

    let instrument = Arc::new(
        Instrument::builder()
            .camera("cam0", camera.clone())
            .tiling_stage("stage_x", Arc::new(MockStage::new("x")))
            .daq("daq0", Arc::new(MockTriggerDevice::new()))
            .channel("488", vec![])
            .build(),
    );
    let mut registry = OperationRegistry::new();
    registry.add_writer("cam0", "preview", writer.clone());

    let engine =
        AcquisitionEngine::new(instrument, registry, ScanPlan::new(vec![tile(0, 10)])).unwrap();
    engine.run().await.unwrap();

    // Buffers toggled at each boundary, but no region was ever handed over.
    assert!(writer.chunk_sizes().is_empty());
    assert_eq!(camera.frames_grabbed(), 10);
}

#[tokio::test]
async fn mismatched_writer_chunk_sizes_fail_before_hardware_is_touched() {
    use spim_acquisition::{AcquisitionEngine, Instrument, OperationRegistry};
    use spim_core::ScanPlan;
    use spim_driver_mock::{MockCamera, MockStage, MockTriggerDevice, MockWriter};
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let stage = Arc::new(MockStage::new("x"));
    let daq = Arc::new(MockTriggerDevice::new());
    let camera = Arc::new(MockCamera::new(16, 16));

    let instrument = Arc::new(
        Instrument::builder()
            .camera("cam0", camera.clone())
            .tiling_stage("stage_x", stage.clone())
            .daq("daq0", daq.clone())
            .channel("488", vec![])
            .build(),
    );

    // Two writers at 8 frames per chunk pass; a third at 16 is fatal.
    let mut ok_registry = OperationRegistry::new();
    ok_registry.add_writer("cam0", "zarr", Arc::new(MockWriter::new(8, dir.path())));
    ok_registry.add_writer("cam0", "tiff", Arc::new(MockWriter::new(8, dir.path())));
    assert_eq!(ok_registry.session_chunk_size().unwrap(), 8);

    let mut bad_registry = OperationRegistry::new();
    bad_registry.add_writer("cam0", "zarr", Arc::new(MockWriter::new(8, dir.path())));
    bad_registry.add_writer("cam0", "tiff", Arc::new(MockWriter::new(8, dir.path())));
    bad_registry.add_writer("cam0", "preview", Arc::new(MockWriter::new(16, dir.path())));

    let err = AcquisitionEngine::new(
        instrument,
        bad_registry,
        ScanPlan::new(vec![tile(0, 32)]),
    )
    .err()
    .unwrap();
    assert!(matches!(err, EngineError::ChunkSizeMismatch { .. }));

    // Validation failed before any stage motion or trigger activity.
    assert_eq!(stage.move_count(), 0);
    assert!(daq.events().is_empty());
    assert_eq!(camera.frames_grabbed(), 0);
}

#[tokio::test]
async fn unknown_channel_is_rejected_at_construction() {
    use spim_acquisition::{AcquisitionEngine, Instrument, OperationRegistry};
    use spim_core::ScanPlan;
    use spim_driver_mock::{MockCamera, MockWriter};
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let instrument = Arc::new(
        Instrument::builder()
            .camera("cam0", Arc::new(MockCamera::new(16, 16)))
            .channel("488", vec![])
            .build(),
    );
    let mut registry = OperationRegistry::new();
    registry.add_writer("cam0", "zarr", Arc::new(MockWriter::new(4, dir.path())));

    let mut bad_tile = tile(0, 8);
    bad_tile.channel = "639".into();

    let err = AcquisitionEngine::new(instrument, registry, ScanPlan::new(vec![bad_tile]))
        .err()
        .unwrap();
    assert!(matches!(
        err,
        EngineError::UnknownChannel { tile: 0, .. }
    ));
}

#[tokio::test]
async fn camera_without_writer_is_rejected() {
    use spim_acquisition::{AcquisitionEngine, Instrument, OperationRegistry};
    use spim_core::ScanPlan;
    use spim_driver_mock::{MockCamera, MockWriter};
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let instrument = Arc::new(
        Instrument::builder()
            .camera("cam0", Arc::new(MockCamera::new(16, 16)))
            .camera("cam1", Arc::new(MockCamera::new(16, 16)))
            .channel("488", vec![])
            .build(),
    );
    let mut registry = OperationRegistry::new();
    registry.add_writer("cam0", "zarr", Arc::new(MockWriter::new(4, dir.path())));

    let err = AcquisitionEngine::new(instrument, registry, ScanPlan::new(vec![tile(0, 8)]))
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::MissingWriter { camera } if camera == "cam1"));
}

#[tokio::test]
async fn writer_drain_delay_does_not_lose_frames() {
    use spim_acquisition::{AcquisitionEngine, Instrument, OperationRegistry};
    use spim_core::ScanPlan;
    use spim_driver_mock::{MockCamera, MockStage, MockTriggerDevice, MockWriter};
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let writer = Arc::new(
        MockWriter::new(4, dir.path()).with_drain_delay(Duration::from_millis(5)),
    );
    let instrument = Arc::new(
        Instrument::builder()
            .camera("cam0", Arc::new(MockCamera::new(16, 16)))
            .tiling_stage("stage_x", Arc::new(MockStage::new("x")))
            .daq("daq0", Arc::new(MockTriggerDevice::new()))
            .channel("488", vec![])
            .build(),
    );
    let mut registry = OperationRegistry::new();
    registry.add_writer("cam0", "slow", writer.clone());

    let engine =
        AcquisitionEngine::new(instrument, registry, ScanPlan::new(vec![tile(0, 12)])).unwrap();
    engine.run().await.unwrap();

    assert_eq!(writer.chunk_sizes(), vec![4, 4, 4]);
    assert_eq!(writer.frames_written(), 12);
}
