//! Cooperative cancellation across concurrently capturing cameras.

mod common;

use common::{tile, RigBuilder};
use spim_acquisition::RunOutcome;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn stop_mid_capture_brings_every_camera_to_stopped() {
    let (engine, rig) = RigBuilder {
        cameras: 2,
        chunk_count_px: 8,
        exposure: Duration::from_millis(5),
        ..Default::default()
    }
    .build(vec![tile(0, 500)]);

    let engine = Arc::new(engine);
    let runner = engine.clone();
    let run_handle = tokio::spawn(async move { runner.run().await });

    // Let both cameras get a few chunks in, then pull the plug.
    tokio::time::sleep(Duration::from_millis(60)).await;
    engine.stop().await.unwrap();

    // The run winds down within a bounded number of poll intervals.
    let outcome = tokio::time::timeout(Duration::from_secs(5), run_handle)
        .await
        .expect("run did not wind down after stop")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, RunOutcome::Cancelled);

    for camera in &rig.cameras {
        // Draining stopped the camera; nowhere near the full tile ran.
        assert!(!camera.is_started());
        assert!(camera.frames_grabbed() < 500);
    }
    for writer in &rig.writers {
        assert!(writer.frames_written() < 500);
    }
}

#[tokio::test]
async fn stop_before_run_cancels_immediately() {
    let (engine, rig) = RigBuilder {
        chunk_count_px: 4,
        ..Default::default()
    }
    .build(vec![tile(0, 8)]);

    engine.stop().await.unwrap();
    let outcome = engine.run().await.unwrap();
    assert_eq!(outcome, RunOutcome::Cancelled);

    // Cancellation before the first tile: no motion, no frames.
    assert_eq!(rig.tiling_stage.move_count(), 0);
    assert_eq!(rig.cameras[0].frames_grabbed(), 0);
}

#[tokio::test]
async fn stop_is_idempotent() {
    let (engine, _rig) = RigBuilder {
        chunk_count_px: 4,
        ..Default::default()
    }
    .build(vec![tile(0, 8)]);

    engine.stop().await.unwrap();
    engine.stop().await.unwrap();
    assert!(engine.cancel_token().is_cancelled());
}
